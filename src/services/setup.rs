use crate::core::config::Config;
use crate::services::tts::elevenlabs;
use anyhow::Result;
use inquire::{Confirm, Select, Text};
use std::path::Path;

/// Brief fields that still need a value.
pub fn missing_brief_fields(config: &Config) -> Vec<&'static str> {
    let story = &config.story;
    [
        ("genre", &story.genre),
        ("characters", &story.characters),
        ("setting", &story.setting),
    ]
    .into_iter()
    .filter(|(_, v)| v.trim().is_empty())
    .map(|(k, _)| k)
    .collect()
}

fn needs_narrator_choice(config: &Config) -> bool {
    config
        .audio
        .elevenlabs
        .as_ref()
        .is_some_and(|c| !c.api_key.trim().is_empty() && c.narrator_voice.is_none())
}

/// Fills in whatever the config leaves open by asking on the terminal, then
/// saves the config. Does nothing in unattended mode.
pub fn run_setup(config: &mut Config) -> Result<()> {
    if config.unattended {
        return Ok(());
    }
    let mut needs_save = false;

    for field in missing_brief_fields(config) {
        let answer = Text::new(&format!("Story {}:", field)).prompt()?;
        let story = &mut config.story;
        match field {
            "genre" => story.genre = answer,
            "characters" => story.characters = answer,
            _ => story.setting = answer,
        }
        needs_save = true;
    }

    if needs_narrator_choice(config) {
        let selection = Select::new("Select ElevenLabs narrator voice:", elevenlabs::voice_names())
            .prompt()?;
        if let Some(cfg) = config.audio.elevenlabs.as_mut() {
            cfg.narrator_voice = Some(selection.to_string());
            needs_save = true;
        }
    }

    if needs_save {
        config.save()?;
        println!("Configuration saved.");
    }
    Ok(())
}

/// Asks whether a previous voice session should be removed before a new run.
/// Never answers yes on its own.
pub fn confirm_clear_session(config: &Config) -> Result<bool> {
    let voice_folder = config.voice_folder();
    if config.unattended || !Path::new(&voice_folder).exists() {
        return Ok(false);
    }
    let answer = Confirm::new(&format!(
        "{} already has audio from a previous run. Delete it first?",
        voice_folder
    ))
    .with_default(true)
    .prompt()?;
    Ok(answer)
}
