use super::{ProviderKind, SpeechProvider};
use crate::services::voices::{VoiceCatalog, VoiceProfile};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_VOICE: &str = "default";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GoogleTranslateConfig {
    /// Falls back to `audio.language` when unset.
    pub language: Option<String>,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for GoogleTranslateConfig {
    fn default() -> Self {
        Self {
            language: None,
            max_chars: default_max_chars(),
            delay_ms: default_delay_ms(),
            base_url: default_base_url(),
        }
    }
}

fn default_max_chars() -> usize {
    200
}
fn default_delay_ms() -> u64 {
    250
}
fn default_base_url() -> String {
    "https://translate.google.com/translate_tts".to_string()
}

/// Unauthenticated Translate TTS endpoint. One voice per language, short inputs only.
pub struct GoogleTranslateClient {
    config: GoogleTranslateConfig,
    language: String,
    client: reqwest::Client,
}

impl GoogleTranslateClient {
    pub fn new(config: GoogleTranslateConfig, fallback_language: &str) -> Self {
        let language = config
            .language
            .clone()
            .unwrap_or_else(|| fallback_language.to_string());
        Self {
            config,
            language,
            client: reqwest::Client::new(),
        }
    }

    fn request_url(&self, text: &str) -> Result<url::Url> {
        let url = url::Url::parse_with_params(
            &self.config.base_url,
            &[
                ("ie", "UTF-8"),
                ("tl", self.language.as_str()),
                ("client", "tw-ob"),
                ("q", text),
            ],
        )?;
        Ok(url)
    }
}

#[async_trait]
impl SpeechProvider for GoogleTranslateClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GoogleTranslate
    }

    fn max_input_chars(&self) -> usize {
        self.config.max_chars
    }

    fn catalog(&self) -> VoiceCatalog {
        VoiceCatalog::single(VoiceProfile::plain(DEFAULT_VOICE))
    }

    fn inter_request_delay(&self) -> Option<Duration> {
        Some(Duration::from_millis(self.config.delay_ms))
    }

    async fn synthesize(&self, text: &str, _voice: &VoiceProfile) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(self.request_url(text)?)
            .header("User-Agent", "Mozilla/5.0")
            .send()
            .await
            .context("Google Translate TTS request failed")?;

        if !resp.status().is_success() {
            return Err(anyhow!("Google Translate TTS error: {}", resp.status()));
        }

        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Err(anyhow!("Google Translate TTS returned empty audio"));
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encodes_text_and_language() {
        let client = GoogleTranslateClient::new(GoogleTranslateConfig::default(), "en");
        let url = client.request_url("Rain falls & thunder.").unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("tl".to_string(), "en".to_string())));
        assert!(pairs.contains(&("q".to_string(), "Rain falls & thunder.".to_string())));
        assert!(url.as_str().starts_with("https://translate.google.com/translate_tts?"));
    }

    #[test]
    fn test_configured_language_wins() {
        let config = GoogleTranslateConfig {
            language: Some("en-GB".to_string()),
            ..Default::default()
        };
        let client = GoogleTranslateClient::new(config, "en");
        assert_eq!(client.language, "en-GB");
        assert_eq!(client.max_input_chars(), 200);
        assert_eq!(client.inter_request_delay(), Some(Duration::from_millis(250)));
        assert_eq!(client.catalog().narrator.id, DEFAULT_VOICE);
    }
}
