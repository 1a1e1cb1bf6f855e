use anyhow::Result;
use plot2audio::core::config::Config;
use plot2audio::core::io::{NativeStorage, Storage};
use plot2audio::services::llm::create_llm;
use plot2audio::services::setup;
use plot2audio::services::tts::create_speech_chain;
use plot2audio::services::usage::{SystemClock, UsageLedger};
use plot2audio::services::workflow::WorkflowManager;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // 1. Load Config
    let mut config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please ensure 'config.yml' exists with valid LLM and audio settings.");
            return Err(e);
        }
    };

    config.ensure_directories()?;

    // 2. Interactive Setup (story brief, narrator voice)
    setup::run_setup(&mut config)?;

    let storage: Arc<dyn Storage> = Arc::new(NativeStorage::new());

    // 3. Stale audio from an earlier run is only removed on request
    if setup::confirm_clear_session(&config)? {
        storage.delete(&config.voice_folder()).await?;
        println!("Cleared {}", config.voice_folder());
    }

    // 4. Initialize LLM and speech chain
    let llm = create_llm(&config)?;
    let chain = create_speech_chain(&config)?;

    let ledger = UsageLedger::load(
        storage.as_ref(),
        &config.usage.file,
        config.usage.monthly_limit,
        Box::new(SystemClock),
    )
    .await?;

    // 5. Run Workflow
    let mut manager = WorkflowManager::new(config.clone(), llm, chain, ledger, storage);
    let manifest = manager.run().await?;

    if !manifest.act_files.is_empty() {
        println!("Act audio:");
        for file in &manifest.act_files {
            println!("  {}", file);
        }
    }
    println!("Manifest written to {}", config.manifest_path());

    Ok(())
}
