use crate::core::config::Config;
use crate::services::voices::{VoiceCatalog, VoiceProfile};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub mod elevenlabs;
pub mod google_cloud;
pub mod google_translate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "elevenlabs")]
    ElevenLabs,
    #[serde(rename = "google_cloud")]
    GoogleCloud,
    #[serde(rename = "google_translate")]
    GoogleTranslate,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::ElevenLabs => "elevenlabs",
            ProviderKind::GoogleCloud => "google_cloud",
            ProviderKind::GoogleTranslate => "google_translate",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "elevenlabs" | "eleven_labs" => Some(ProviderKind::ElevenLabs),
            "google_cloud" | "gcp" => Some(ProviderKind::GoogleCloud),
            "google_translate" | "google" => Some(ProviderKind::GoogleTranslate),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Longest text accepted by a single `synthesize` call.
    fn max_input_chars(&self) -> usize;

    /// Metered providers draw from the monthly character budget.
    fn is_metered(&self) -> bool {
        false
    }

    fn catalog(&self) -> VoiceCatalog;

    /// Whether a user-supplied voice identifier can be sent to this provider.
    fn accepts_voice(&self, id: &str) -> bool {
        self.catalog().knows(id)
    }

    /// Pause between consecutive chunk requests for one element.
    fn inter_request_delay(&self) -> Option<Duration> {
        None
    }

    fn file_extension(&self) -> &'static str {
        "mp3"
    }

    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<Vec<u8>>;
}

pub type SpeechChain = Vec<Arc<dyn SpeechProvider>>;

/// Builds the provider priority chain. `auto` yields every configured provider,
/// metered first and the free provider last; any other name pins one provider.
pub fn create_speech_chain(config: &Config) -> Result<SpeechChain> {
    let audio = &config.audio;
    let language = audio.language.clone();
    info!("Initializing speech chain for provider: {}", audio.provider);

    let elevenlabs = || -> Option<Arc<dyn SpeechProvider>> {
        audio
            .elevenlabs
            .as_ref()
            .filter(|c| !c.api_key.trim().is_empty())
            .map(|c| Arc::new(elevenlabs::ElevenLabsClient::new(c.clone())) as Arc<dyn SpeechProvider>)
    };
    let google_cloud = || -> Option<Arc<dyn SpeechProvider>> {
        audio
            .google_cloud
            .as_ref()
            .filter(|c| !c.api_key.trim().is_empty())
            .map(|c| Arc::new(google_cloud::GoogleCloudClient::new(c.clone())) as Arc<dyn SpeechProvider>)
    };
    let google_translate = || -> Arc<dyn SpeechProvider> {
        let cfg = audio.google_translate.clone().unwrap_or_default();
        Arc::new(google_translate::GoogleTranslateClient::new(cfg, &language))
    };

    if audio.provider.eq_ignore_ascii_case("auto") {
        let mut chain: SpeechChain = Vec::new();
        chain.extend(elevenlabs());
        chain.extend(google_cloud());
        chain.push(google_translate());
        let names: Vec<&str> = chain.iter().map(|p| p.kind().as_str()).collect();
        info!("Speech chain: {}", names.join(" -> "));
        return Ok(chain);
    }

    let kind = ProviderKind::parse(&audio.provider)
        .ok_or_else(|| anyhow!("Unknown TTS provider: {}", audio.provider))?;
    let provider = match kind {
        ProviderKind::ElevenLabs => {
            elevenlabs().ok_or_else(|| anyhow!("ElevenLabs config missing or has no api_key"))?
        }
        ProviderKind::GoogleCloud => google_cloud()
            .ok_or_else(|| anyhow!("Google Cloud TTS config missing or has no api_key"))?,
        ProviderKind::GoogleTranslate => google_translate(),
    };
    Ok(vec![provider])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(audio_yaml: &str) -> Config {
        let yaml = format!(
            "story:\n  genre: noir\n  characters: a detective\n  setting: a port town\nllm:\n  provider: huggingface\n{}",
            audio_yaml
        );
        Config::from_yaml(&yaml).unwrap()
    }

    fn kinds(chain: &SpeechChain) -> Vec<ProviderKind> {
        chain.iter().map(|p| p.kind()).collect()
    }

    #[test]
    fn test_auto_chain_orders_by_priority() {
        let cfg = config(
            "audio:\n  elevenlabs:\n    api_key: xi\n  google_cloud:\n    api_key: gk\n",
        );
        let chain = create_speech_chain(&cfg).unwrap();
        assert_eq!(
            kinds(&chain),
            vec![
                ProviderKind::ElevenLabs,
                ProviderKind::GoogleCloud,
                ProviderKind::GoogleTranslate
            ]
        );
        assert!(chain[0].is_metered());
        assert!(!chain[1].is_metered());
    }

    #[test]
    fn test_auto_chain_skips_unconfigured() {
        let cfg = config("audio:\n  elevenlabs:\n    api_key: ''\n");
        let chain = create_speech_chain(&cfg).unwrap();
        assert_eq!(kinds(&chain), vec![ProviderKind::GoogleTranslate]);
        assert_eq!(chain[0].max_input_chars(), 200);
    }

    #[test]
    fn test_pinned_provider() {
        let cfg = config("audio:\n  provider: google_cloud\n  google_cloud:\n    api_key: gk\n");
        let chain = create_speech_chain(&cfg).unwrap();
        assert_eq!(kinds(&chain), vec![ProviderKind::GoogleCloud]);

        let cfg = config("audio:\n  provider: elevenlabs\n");
        assert!(create_speech_chain(&cfg).is_err());

        let cfg = config("audio:\n  provider: polly\n");
        assert!(create_speech_chain(&cfg).is_err());
    }

    #[test]
    fn test_provider_kind_names() {
        assert_eq!(ProviderKind::parse("ElevenLabs"), Some(ProviderKind::ElevenLabs));
        assert_eq!(ProviderKind::parse("google-cloud"), Some(ProviderKind::GoogleCloud));
        assert_eq!(
            serde_json::to_string(&ProviderKind::GoogleTranslate).unwrap(),
            "\"google_translate\""
        );
    }
}
