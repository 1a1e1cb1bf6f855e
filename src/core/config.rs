use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::services::llm::LlmConfig;
use crate::services::story::StoryBrief;
use crate::services::tts::elevenlabs::ElevenLabsConfig;
use crate::services::tts::google_cloud::GoogleCloudConfig;
use crate::services::tts::google_translate::GoogleTranslateConfig;
use crate::services::usage::DEFAULT_MONTHLY_LIMIT;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_input")]
    pub input_folder: String,

    #[serde(default = "default_output")]
    pub output_folder: String,

    #[serde(default = "default_build")]
    pub build_folder: String,

    #[serde(default)]
    pub unattended: bool,

    #[serde(default)]
    pub story: StoryBrief,

    pub llm: LlmConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub usage: UsageConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AudioConfig {
    /// `auto` walks the whole chain; any provider name pins that provider alone.
    #[serde(default = "default_tts_provider")]
    pub provider: String,
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_true")]
    pub include_narration: bool,
    #[serde(default)]
    pub skip_scene_headings: bool,
    #[serde(default = "default_true")]
    pub skip_transitions: bool,

    /// Character name (any case) to voice identifier.
    #[serde(default)]
    pub voice_overrides: BTreeMap<String, String>,

    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_true")]
    pub merge_acts: bool,

    pub elevenlabs: Option<ElevenLabsConfig>,
    pub google_cloud: Option<GoogleCloudConfig>,
    pub google_translate: Option<GoogleTranslateConfig>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            provider: default_tts_provider(),
            language: default_language(),
            include_narration: true,
            skip_scene_headings: false,
            skip_transitions: true,
            voice_overrides: BTreeMap::new(),
            max_concurrency: default_concurrency(),
            merge_acts: true,
            elevenlabs: None,
            google_cloud: None,
            google_translate: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UsageConfig {
    #[serde(default = "default_usage_file")]
    pub file: String,
    #[serde(default = "default_monthly_limit")]
    pub monthly_limit: u64,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            file: default_usage_file(),
            monthly_limit: default_monthly_limit(),
        }
    }
}

fn default_input() -> String {
    "input".to_string()
}
fn default_output() -> String {
    "output".to_string()
}
fn default_build() -> String {
    "build".to_string()
}
fn default_language() -> String {
    "en".to_string()
}
fn default_tts_provider() -> String {
    "auto".to_string()
}
fn default_true() -> bool {
    true
}
fn default_concurrency() -> usize {
    4
}
fn default_usage_file() -> String {
    "data/tts-usage.json".to_string()
}
fn default_monthly_limit() -> u64 {
    DEFAULT_MONTHLY_LIMIT
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Path::new("config.yml");
        if !path.exists() {
            anyhow::bail!("config.yml not found. Please create one.");
        }

        let content = fs::read_to_string(path).context("Failed to read config.yml")?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml_ng::from_str(content).context("Failed to parse config.yml")
    }

    pub fn save(&self) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write("config.yml", content).context("Failed to write config.yml")?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.input_folder)?;
        fs::create_dir_all(&self.output_folder)?;
        fs::create_dir_all(&self.build_folder)?;
        Ok(())
    }

    /// Root of the act-partitioned voice session.
    pub fn voice_folder(&self) -> String {
        Path::new(&self.output_folder)
            .join("voice")
            .to_string_lossy()
            .to_string()
    }

    pub fn manifest_path(&self) -> String {
        Path::new(&self.output_folder)
            .join("manifest.json")
            .to_string_lossy()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let yaml = r#"
story:
  genre: thriller
  characters: A detective and her estranged brother
  setting: Rain-soaked Seattle
llm:
  anthropic:
    api_key: sk-ant-test
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.output_folder, "output");
        assert_eq!(config.audio.provider, "auto");
        assert!(config.audio.include_narration);
        assert!(config.audio.skip_transitions);
        assert_eq!(config.usage.monthly_limit, 10_000);
        assert_eq!(config.llm.retry_count, 3);
        assert_eq!(config.llm.provider, "auto");
        assert_eq!(config.llm.anthropic.as_ref().unwrap().max_tokens, 2000);
        assert!(config.voice_folder().ends_with("voice"));
    }

    #[test]
    fn test_voice_overrides_and_provider_tables() {
        let yaml = r#"
story:
  genre: horror
  characters: two siblings
  setting: a lighthouse
llm:
  provider: openai
  openai:
    api_key: sk-test
    model: gpt-4o-mini
audio:
  provider: google_cloud
  voice_overrides:
    JOHN: arnold
  google_cloud:
    api_key: abc
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.audio.provider, "google_cloud");
        assert_eq!(
            config.audio.voice_overrides.get("JOHN").map(String::as_str),
            Some("arnold")
        );
        let gcp = config.audio.google_cloud.unwrap();
        assert_eq!(gcp.api_key, "abc");
        assert_eq!(gcp.language_code, "en-US");
    }
}
