use crate::core::config::Config;
use crate::core::io::Storage;
use crate::services::dispatcher::{ProviderLane, SynthesisDispatcher, SynthesisResult};
use crate::services::llm::LlmClient;
use crate::services::roster::Roster;
use crate::services::script::{
    distinct_characters, tokenize, Act, ElementKind, ScriptElement, TokenizerOptions, NARRATOR,
};
use crate::services::story::{generate_plot, generate_script, parse_plot_acts};
use crate::services::tts::{ProviderKind, SpeechChain};
use crate::services::usage::{UsageLedger, UsageStats};
use crate::services::voices::{VoiceAssignment, VoiceResolver};
use crate::utils::audio::merge_stored_files;
use anyhow::{bail, Result};
use chrono::Local;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

const PLOT_FILE: &str = "plot.txt";
const SCRIPT_FILE: &str = "script.txt";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    pub character: String,
    pub text: String,
    pub sequence: usize,
    pub act: Act,
    pub kind: ElementKind,
    pub filename: String,
    pub path: String,
    pub provider: Option<ProviderKind>,
    pub voice_id: Option<String>,
    pub success: bool,
    pub size_bytes: Option<usize>,
    pub error: Option<String>,
}

impl From<&SynthesisResult> for ManifestEntry {
    fn from(result: &SynthesisResult) -> Self {
        Self {
            character: result.element.character.clone(),
            text: result.element.text.clone(),
            sequence: result.element.sequence,
            act: result.element.act,
            kind: result.element.kind,
            filename: result.filename.clone(),
            path: result.output_path.clone(),
            provider: result.provider,
            voice_id: result.voice_id.clone(),
            success: result.success,
            size_bytes: result.size_bytes,
            error: result.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub by_provider: BTreeMap<String, usize>,
    pub usage: UsageStats,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunManifest {
    pub title: Option<String>,
    pub entries: Vec<ManifestEntry>,
    pub summary: ManifestSummary,
    pub assignments: BTreeMap<String, VoiceAssignment>,
    pub act_files: Vec<String>,
    /// Clips found in the act folders that this run did not write.
    pub stale_clips: Vec<String>,
}

pub fn build_summary(results: &[SynthesisResult], usage: UsageStats) -> ManifestSummary {
    let successful = results.iter().filter(|r| r.success).count();
    let mut by_provider = BTreeMap::new();
    for result in results.iter().filter(|r| r.success) {
        if let Some(kind) = result.provider {
            *by_provider.entry(kind.as_str().to_string()).or_insert(0) += 1;
        }
    }
    ManifestSummary {
        total: results.len(),
        successful,
        failed: results.len() - successful,
        by_provider,
        usage,
        generated_at: Local::now().to_rfc3339(),
    }
}

pub struct WorkflowManager {
    config: Config,
    llm: Box<dyn LlmClient>,
    chain: SpeechChain,
    ledger: Arc<Mutex<UsageLedger>>,
    storage: Arc<dyn Storage>,
}

impl WorkflowManager {
    pub fn new(
        config: Config,
        llm: Box<dyn LlmClient>,
        chain: SpeechChain,
        ledger: UsageLedger,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            config,
            llm,
            chain,
            ledger: Arc::new(Mutex::new(ledger)),
            storage,
        }
    }

    fn build_path(&self, name: &str) -> String {
        Path::new(&self.config.build_folder)
            .join(name)
            .to_string_lossy()
            .to_string()
    }

    /// Cached text from the build folder, then the input folder.
    async fn load_cached(&self, name: &str) -> Result<Option<(String, bool)>> {
        let build = self.build_path(name);
        if self.storage.exists(&build).await? {
            return Ok(Some((self.storage.read_to_string(&build).await?, true)));
        }
        let input = Path::new(&self.config.input_folder)
            .join(name)
            .to_string_lossy()
            .to_string();
        if self.storage.exists(&input).await? {
            return Ok(Some((self.storage.read_to_string(&input).await?, false)));
        }
        Ok(None)
    }

    pub async fn ensure_plot(&self) -> Result<String> {
        let plot = match self.load_cached(PLOT_FILE).await? {
            Some((plot, true)) => {
                println!("Using cached plot from {}", self.build_path(PLOT_FILE));
                return Ok(plot);
            }
            Some((plot, false)) => {
                println!("Using plot from input folder");
                plot
            }
            None => generate_plot(self.llm.as_ref(), &self.config.llm, &self.config.story).await?,
        };

        self.storage
            .write(&self.build_path(PLOT_FILE), plot.as_bytes())
            .await?;
        let acts = parse_plot_acts(&plot);
        for act in Act::ALL {
            let text = acts.get(act);
            if text.is_empty() {
                warn!("Plot has no ACT {} section", act.label());
                continue;
            }
            let name = format!("plot-act-{}.txt", act.label().to_ascii_lowercase());
            self.storage
                .write(&self.build_path(&name), text.as_bytes())
                .await?;
        }
        Ok(plot)
    }

    pub async fn ensure_script(&self, plot: &str) -> Result<String> {
        let script = match self.load_cached(SCRIPT_FILE).await? {
            Some((script, true)) => {
                println!("Using cached script from {}", self.build_path(SCRIPT_FILE));
                return Ok(script);
            }
            Some((script, false)) => {
                println!("Using script from input folder");
                script
            }
            None => {
                generate_script(self.llm.as_ref(), &self.config.llm, plot, &self.config.story)
                    .await?
            }
        };
        self.storage
            .write(&self.build_path(SCRIPT_FILE), script.as_bytes())
            .await?;
        Ok(script)
    }

    /// Elements to synthesize under the current audio settings.
    pub fn tokenize_script(&self, script: &str) -> Vec<ScriptElement> {
        let options = TokenizerOptions {
            narrator_name: NARRATOR.to_string(),
            skip_scene_headings: self.config.audio.skip_scene_headings,
            skip_transitions: self.config.audio.skip_transitions,
        };
        let mut elements = tokenize(script, &options);
        if !self.config.audio.include_narration {
            elements.retain(|e| e.kind == ElementKind::Dialogue);
        }
        elements
    }

    pub fn resolve_lanes(&self, roster: &Roster, elements: &[ScriptElement]) -> Result<Vec<ProviderLane>> {
        let characters = distinct_characters(elements, NARRATOR);
        let resolver = VoiceResolver::new(roster, &self.config.audio.voice_overrides, NARRATOR);
        self.chain
            .iter()
            .map(|provider| -> Result<ProviderLane> {
                let assignment = resolver.assign_for(&characters, provider.as_ref())?;
                Ok(ProviderLane {
                    provider: provider.clone(),
                    assignment,
                })
            })
            .collect()
    }

    /// Concatenates each act's successful clips into `<output>/voice-act-<n>.mp3`.
    async fn merge_acts(&self, results: &[SynthesisResult]) -> Result<Vec<String>> {
        let mut merged = Vec::new();
        for act in Act::ALL {
            let inputs: Vec<String> = results
                .iter()
                .filter(|r| r.success && r.element.act == act)
                .map(|r| r.output_path.clone())
                .collect();
            if inputs.is_empty() {
                continue;
            }
            let output = Path::new(&self.config.output_folder)
                .join(format!("{}.mp3", act.folder_name()))
                .to_string_lossy()
                .to_string();
            merge_stored_files(&inputs, &output, self.storage.as_ref()).await?;
            println!("ACT {}: {} clips merged into {}", act.label(), inputs.len(), output);
            merged.push(output);
        }
        Ok(merged)
    }

    async fn stale_clips(&self, results: &[SynthesisResult]) -> Result<Vec<String>> {
        let written: HashSet<&str> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.output_path.as_str())
            .collect();
        let voice_folder = self.config.voice_folder();
        let mut stale = Vec::new();
        for act in Act::ALL {
            let folder = Path::new(&voice_folder)
                .join(act.folder_name())
                .to_string_lossy()
                .to_string();
            for path in self.storage.list(&folder).await? {
                if !written.contains(path.as_str()) {
                    stale.push(path);
                }
            }
        }
        if !stale.is_empty() {
            warn!(
                "{} clips in {} are left over from an earlier run",
                stale.len(),
                voice_folder
            );
        }
        Ok(stale)
    }

    pub async fn run(&mut self) -> Result<RunManifest> {
        if self.chain.is_empty() {
            bail!("No speech provider available");
        }

        let plot = self.ensure_plot().await?;
        let script = self.ensure_script(&plot).await?;

        let roster = Roster::extract(&plot);
        if roster.is_empty() {
            warn!("Plot has no CHARACTERS roster, falling back to name heuristics");
        } else {
            info!("Roster: {} characters", roster.entries().len());
        }

        let elements = self.tokenize_script(&script);
        if elements.is_empty() {
            warn!("Script produced no speakable elements");
        }
        println!("Script has {} elements", elements.len());

        let lanes = self.resolve_lanes(&roster, &elements)?;
        let assignments: BTreeMap<String, VoiceAssignment> = lanes
            .iter()
            .map(|lane| (lane.provider.kind().as_str().to_string(), lane.assignment.clone()))
            .collect();

        let dispatcher = SynthesisDispatcher::new(
            lanes,
            self.ledger.clone(),
            self.storage.clone(),
            &self.config.voice_folder(),
            self.config.audio.max_concurrency,
        )
        .with_ledger_file(&self.config.usage.file);
        let results = dispatcher.dispatch(&elements).await?;

        let stale_clips = self.stale_clips(&results).await?;
        let act_files = if self.config.audio.merge_acts {
            self.merge_acts(&results).await?
        } else {
            Vec::new()
        };

        let usage = {
            let mut ledger = self.ledger.lock().await;
            ledger.save(self.storage.as_ref(), &self.config.usage.file).await?;
            ledger.current_stats()
        };

        let manifest = RunManifest {
            title: self.config.story.title.clone(),
            entries: results.iter().map(ManifestEntry::from).collect(),
            summary: build_summary(&results, usage),
            assignments,
            act_files,
            stale_clips,
        };
        self.storage
            .write(
                &self.config.manifest_path(),
                serde_json::to_string_pretty(&manifest)?.as_bytes(),
            )
            .await?;

        println!(
            "Generated {}/{} clips ({} failed). Quota: {} of {} characters used.",
            manifest.summary.successful,
            manifest.summary.total,
            manifest.summary.failed,
            manifest.summary.usage.used,
            manifest.summary.usage.limit
        );
        Ok(manifest)
    }
}
