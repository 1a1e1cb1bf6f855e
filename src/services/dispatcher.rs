use crate::core::io::Storage;
use crate::services::script::ScriptElement;
use crate::services::tts::{ProviderKind, SpeechProvider};
use crate::services::usage::UsageLedger;
use crate::services::voices::{VoiceAssignment, VoiceProfile};
use crate::utils::audio::concat_segments;
use anyhow::{anyhow, bail, Result};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesisResult {
    pub element: ScriptElement,
    pub provider: Option<ProviderKind>,
    pub voice_id: Option<String>,
    pub success: bool,
    pub filename: String,
    pub output_path: String,
    pub size_bytes: Option<usize>,
    pub error: Option<String>,
}

/// One provider in the chain with the voices resolved for it.
pub struct ProviderLane {
    pub provider: Arc<dyn SpeechProvider>,
    pub assignment: VoiceAssignment,
}

/// Splits `text` into pieces of at most `max_chars` characters by raw offset.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// `<sequence:03>_<CHARACTER_WITH_UNDERSCORES>.<ext>`
pub fn output_file_name(element: &ScriptElement, extension: &str) -> String {
    format!(
        "{:03}_{}.{}",
        element.sequence,
        element.character.replace(' ', "_"),
        extension
    )
}

pub struct SynthesisDispatcher {
    lanes: Vec<ProviderLane>,
    ledger: Arc<Mutex<UsageLedger>>,
    ledger_path: Option<String>,
    storage: Arc<dyn Storage>,
    voice_folder: String,
    max_concurrency: usize,
}

impl SynthesisDispatcher {
    pub fn new(
        lanes: Vec<ProviderLane>,
        ledger: Arc<Mutex<UsageLedger>>,
        storage: Arc<dyn Storage>,
        voice_folder: &str,
        max_concurrency: usize,
    ) -> Self {
        Self {
            lanes,
            ledger,
            ledger_path: None,
            storage,
            voice_folder: voice_folder.to_string(),
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Persist the ledger after every metered success.
    pub fn with_ledger_file(mut self, path: &str) -> Self {
        self.ledger_path = Some(path.to_string());
        self
    }

    fn output_location(&self, element: &ScriptElement, extension: &str) -> (String, String) {
        let filename = output_file_name(element, extension);
        let path = Path::new(&self.voice_folder)
            .join(element.act.folder_name())
            .join(&filename)
            .to_string_lossy()
            .to_string();
        (filename, path)
    }

    async fn synthesize_chunks(
        provider: &dyn SpeechProvider,
        text: &str,
        voice: &VoiceProfile,
    ) -> Result<Vec<u8>> {
        let chunks = split_into_chunks(text, provider.max_input_chars());
        if chunks.len() > 1 {
            debug!(
                "Splitting {} chars into {} chunks for {}",
                text.chars().count(),
                chunks.len(),
                provider.kind()
            );
        }

        let mut segments = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                if let Some(delay) = provider.inter_request_delay() {
                    tokio::time::sleep(delay).await;
                }
            }
            segments.push(provider.synthesize(chunk, voice).await?);
        }
        concat_segments(segments)
    }

    async fn attempt(&self, lane: &ProviderLane, element: &ScriptElement) -> Result<(Vec<u8>, String)> {
        let provider = lane.provider.as_ref();
        let voice = lane
            .assignment
            .voice_for(&element.character)
            .ok_or_else(|| anyhow!("No voice assigned for {}", element.character))?;

        if !provider.is_metered() {
            let audio = Self::synthesize_chunks(provider, &element.text, voice).await?;
            return Ok((audio, voice.id.clone()));
        }

        let characters = element.text.chars().count() as u64;
        {
            let mut ledger = self.ledger.lock().await;
            if !ledger.try_reserve(characters) {
                bail!("monthly character budget exhausted");
            }
        }

        match Self::synthesize_chunks(provider, &element.text, voice).await {
            Ok(audio) => {
                let mut ledger = self.ledger.lock().await;
                ledger.commit(characters, &element.text);
                if let Some(path) = &self.ledger_path {
                    if let Err(e) = ledger.save(self.storage.as_ref(), path).await {
                        warn!("Failed to save usage ledger: {}", e);
                    }
                }
                Ok((audio, voice.id.clone()))
            }
            Err(e) => {
                self.ledger.lock().await.refund(characters);
                Err(e)
            }
        }
    }

    /// Walks the provider chain for one element. Never fails: errors end up in
    /// the returned result.
    pub async fn dispatch_one(&self, element: &ScriptElement) -> SynthesisResult {
        let mut errors = Vec::new();

        for lane in &self.lanes {
            let kind = lane.provider.kind();
            match self.attempt(lane, element).await {
                Ok((audio, voice_id)) => {
                    let (filename, output_path) =
                        self.output_location(element, lane.provider.file_extension());
                    let size = audio.len();
                    return match self.storage.write(&output_path, &audio).await {
                        Ok(()) => {
                            debug!("#{} {} -> {} ({} bytes)", element.sequence, element.character, kind, size);
                            SynthesisResult {
                                element: element.clone(),
                                provider: Some(kind),
                                voice_id: Some(voice_id),
                                success: true,
                                filename,
                                output_path,
                                size_bytes: Some(size),
                                error: None,
                            }
                        }
                        Err(e) => SynthesisResult {
                            element: element.clone(),
                            provider: Some(kind),
                            voice_id: Some(voice_id),
                            success: false,
                            filename,
                            output_path,
                            size_bytes: None,
                            error: Some(format!("{:#}", e)),
                        },
                    };
                }
                Err(e) => {
                    info!("{} skipped #{}: {:#}", kind, element.sequence, e);
                    errors.push(format!("{}: {:#}", kind, e));
                }
            }
        }

        let (filename, output_path) = self.output_location(element, "mp3");
        let error = if errors.is_empty() {
            "no speech provider configured".to_string()
        } else {
            errors.join("; ")
        };
        warn!("Failed to synthesize #{} ({}): {}", element.sequence, element.character, error);
        SynthesisResult {
            element: element.clone(),
            provider: None,
            voice_id: None,
            success: false,
            filename,
            output_path,
            size_bytes: None,
            error: Some(error),
        }
    }

    /// Synthesizes every element concurrently. Results come back in sequence order.
    pub async fn dispatch(&self, elements: &[ScriptElement]) -> Result<Vec<SynthesisResult>> {
        let pb = ProgressBar::new(elements.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                .progress_chars("#>-"),
        );

        let mut results: Vec<SynthesisResult> = futures_util::stream::iter(elements.iter())
            .map(|element| {
                let pb = pb.clone();
                async move {
                    let result = self.dispatch_one(element).await;
                    pb.inc(1);
                    result
                }
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        pb.finish_with_message("Synthesis complete");
        results.sort_by_key(|r| r.element.sequence);
        Ok(results)
    }
}
