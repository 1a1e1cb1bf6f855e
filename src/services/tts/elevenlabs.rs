use super::{ProviderKind, SpeechProvider};
use crate::services::voices::{VoiceCatalog, VoiceProfile};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Named ElevenLabs voices and their API identifiers.
const VOICES: &[(&str, &str)] = &[
    ("adam", "pNInz6obpgDQGcFmaJgB"),
    ("antoni", "ErXwobaYiN019PkySvjV"),
    ("arnold", "VR6AewLTigWG4xSOukaG"),
    ("josh", "TxGEqnHWrfWFTfGW9XjX"),
    ("sam", "yoZ06aMxZJJ28mfd3POQ"),
    ("nigel", "adZJnAl6IYZw4EYI9FVd"),
    ("john", "EiNlNiXeDU1pqqOPrYMO"),
    ("bella", "EXAVITQu4vr4xnSDxMaL"),
    ("elli", "MF3mGyEYCl7XYWbV9V6O"),
    ("rachel", "21m00Tcm4TlvDq8ikWAM"),
    ("domi", "AZnzlk1XvdvUeBnXmlld"),
    ("dorothy", "ThT5KcBeYPX3keUQqHPh"),
];

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_stability")]
    pub stability: f32,
    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,
    pub narrator_voice: Option<String>,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_model_id() -> String {
    "eleven_monolingual_v1".to_string()
}
fn default_stability() -> f32 {
    0.5
}
fn default_similarity_boost() -> f32 {
    0.75
}
fn default_max_chars() -> usize {
    4500
}
fn default_base_url() -> String {
    "https://api.elevenlabs.io/v1".to_string()
}

pub fn voice_names() -> Vec<&'static str> {
    VOICES.iter().map(|(name, _)| *name).collect()
}

/// Maps a voice name like `rachel` to its ID. Unknown names are assumed to be IDs.
pub fn resolve_voice_id(voice: &str) -> String {
    let lower = voice.trim().to_ascii_lowercase();
    VOICES
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, id)| id.to_string())
        .unwrap_or_else(|| voice.trim().to_string())
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

pub struct ElevenLabsClient {
    config: ElevenLabsConfig,
    client: reqwest::Client,
}

impl ElevenLabsClient {
    pub fn new(config: ElevenLabsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, voice_id: &str) -> String {
        format!(
            "{}/text-to-speech/{}",
            self.config.base_url.trim_end_matches('/'),
            voice_id
        )
    }
}

#[async_trait]
impl SpeechProvider for ElevenLabsClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ElevenLabs
    }

    fn max_input_chars(&self) -> usize {
        self.config.max_chars
    }

    fn is_metered(&self) -> bool {
        true
    }

    fn catalog(&self) -> VoiceCatalog {
        let narrator = self.config.narrator_voice.as_deref().unwrap_or("john");
        VoiceCatalog {
            narrator: VoiceProfile::plain(narrator),
            main_male: Some(VoiceProfile::plain("nigel")),
            main_female: Some(VoiceProfile::plain("rachel")),
            supporting_male: ["adam", "antoni", "arnold", "josh", "sam"]
                .into_iter()
                .map(VoiceProfile::plain)
                .collect(),
            supporting_female: ["bella", "elli", "domi", "dorothy"]
                .into_iter()
                .map(VoiceProfile::plain)
                .collect(),
        }
    }

    /// Named voices, or raw voice IDs.
    fn accepts_voice(&self, id: &str) -> bool {
        let id = id.trim();
        resolve_voice_id(id) != id || (id.len() == 20 && id.chars().all(|c| c.is_ascii_alphanumeric()))
    }

    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<Vec<u8>> {
        let voice_id = resolve_voice_id(&voice.id);
        let body = SpeechRequest {
            text,
            model_id: &self.config.model_id,
            voice_settings: VoiceSettings {
                stability: self.config.stability,
                similarity_boost: self.config.similarity_boost,
            },
        };

        let resp = self
            .client
            .post(self.endpoint(&voice_id))
            .header("xi-api-key", &self.config.api_key)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await
            .context("ElevenLabs request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("ElevenLabs API error ({}): {}", status, error_text));
        }

        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Err(anyhow!("ElevenLabs returned empty audio"));
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ElevenLabsConfig {
        serde_yaml_ng::from_str("api_key: xi-test").unwrap()
    }

    #[test]
    fn test_defaults_and_endpoint() {
        let cfg = config();
        assert_eq!(cfg.model_id, "eleven_monolingual_v1");
        assert_eq!(cfg.max_chars, 4500);
        let client = ElevenLabsClient::new(cfg);
        assert_eq!(
            client.endpoint("abc"),
            "https://api.elevenlabs.io/v1/text-to-speech/abc"
        );
    }

    #[test]
    fn test_voice_name_resolution() {
        assert_eq!(resolve_voice_id("Arnold"), "VR6AewLTigWG4xSOukaG");
        assert_eq!(resolve_voice_id("rachel"), "21m00Tcm4TlvDq8ikWAM");
        assert_eq!(resolve_voice_id("customVoiceId123"), "customVoiceId123");
    }

    #[test]
    fn test_catalog_voices_all_resolve() {
        let client = ElevenLabsClient::new(config());
        let catalog = client.catalog();
        assert_eq!(catalog.narrator.id, "john");
        let all = std::iter::once(&catalog.narrator)
            .chain(catalog.main_male.iter())
            .chain(catalog.main_female.iter())
            .chain(catalog.supporting_male.iter())
            .chain(catalog.supporting_female.iter());
        for voice in all {
            assert_ne!(resolve_voice_id(&voice.id), voice.id);
        }
    }

    #[test]
    fn test_request_body_shape() {
        let body = SpeechRequest {
            text: "Hello",
            model_id: "eleven_monolingual_v1",
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
            },
        };
        let json: serde_json::Value = serde_json::to_value(&body).unwrap();
        assert_eq!(json["text"], "Hello");
        assert_eq!(json["voice_settings"]["similarity_boost"], 0.75);
    }
}
