use super::{ProviderKind, SpeechProvider};
use crate::services::voices::{VoiceCatalog, VoiceProfile};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GoogleCloudConfig {
    pub api_key: String,
    #[serde(default = "default_language_code")]
    pub language_code: String,
    pub narrator_voice: Option<String>,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_language_code() -> String {
    "en-US".to_string()
}
fn default_max_chars() -> usize {
    4500
}
fn default_base_url() -> String {
    "https://texttospeech.googleapis.com/v1".to_string()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection,
    audio_config: AudioEncodingConfig,
}

#[derive(Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection {
    language_code: String,
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioEncodingConfig {
    audio_encoding: &'static str,
    speaking_rate: f32,
    pitch: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: Option<String>,
}

/// `en-GB-Wavenet-D` -> `en-GB`.
fn language_code_of(voice_name: &str) -> Option<String> {
    let mut parts = voice_name.split('-');
    let lang = parts.next()?;
    let region = parts.next()?;
    if lang.len() == 2 && region.len() == 2 {
        Some(format!("{}-{}", lang, region))
    } else {
        None
    }
}

fn decode_audio(response: SynthesizeResponse) -> Result<Vec<u8>> {
    let content = response
        .audio_content
        .filter(|c| !c.is_empty())
        .ok_or_else(|| anyhow!("Google Cloud TTS response has no audioContent"))?;
    base64::engine::general_purpose::STANDARD
        .decode(content.as_bytes())
        .context("Google Cloud TTS returned invalid base64 audio")
}

pub struct GoogleCloudClient {
    config: GoogleCloudConfig,
    client: reqwest::Client,
}

impl GoogleCloudClient {
    pub fn new(config: GoogleCloudConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn request_body<'a>(&self, text: &'a str, voice: &VoiceProfile) -> SynthesizeRequest<'a> {
        SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: language_code_of(&voice.id)
                    .unwrap_or_else(|| self.config.language_code.clone()),
                name: voice.id.clone(),
            },
            audio_config: AudioEncodingConfig {
                audio_encoding: "MP3",
                speaking_rate: voice.rate,
                pitch: voice.pitch,
            },
        }
    }
}

#[async_trait]
impl SpeechProvider for GoogleCloudClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GoogleCloud
    }

    fn max_input_chars(&self) -> usize {
        self.config.max_chars
    }

    fn catalog(&self) -> VoiceCatalog {
        let narrator = match &self.config.narrator_voice {
            Some(name) => VoiceProfile::with_prosody(name, 0.82, -10.0),
            None => VoiceProfile::with_prosody("en-US-Wavenet-D", 0.82, -10.0),
        };
        VoiceCatalog {
            narrator,
            main_male: Some(VoiceProfile::with_prosody("en-GB-Wavenet-D", 0.92, -4.0)),
            main_female: Some(VoiceProfile::plain("en-US-Neural2-H")),
            supporting_male: [
                "en-IN-Neural2-B",
                "en-AU-Neural2-D",
                "en-IN-Wavenet-B",
                "en-AU-Wavenet-D",
                "en-GB-Neural2-B",
            ]
            .into_iter()
            .map(VoiceProfile::plain)
            .collect(),
            supporting_female: [
                "en-GB-Neural2-A",
                "en-AU-Neural2-A",
                "en-IN-Neural2-A",
                "en-AU-Wavenet-A",
            ]
            .into_iter()
            .map(VoiceProfile::plain)
            .collect(),
        }
    }

    fn accepts_voice(&self, id: &str) -> bool {
        language_code_of(id.trim()).is_some()
    }

    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<Vec<u8>> {
        let url = url::Url::parse_with_params(
            &format!("{}/text:synthesize", self.config.base_url.trim_end_matches('/')),
            &[("key", self.config.api_key.as_str())],
        )?;

        let resp = self
            .client
            .post(url)
            .json(&self.request_body(text, voice))
            .send()
            .await
            .context("Google Cloud TTS request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Google Cloud TTS error ({}): {}", status, error_text));
        }

        let result: SynthesizeResponse = resp.json().await?;
        decode_audio(result)
    }
}
