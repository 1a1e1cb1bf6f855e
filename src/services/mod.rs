pub mod dispatcher;
pub mod llm;
pub mod roster;
pub mod script;
pub mod setup;
pub mod story;
pub mod tts;
pub mod usage;
pub mod voices;
pub mod workflow;
