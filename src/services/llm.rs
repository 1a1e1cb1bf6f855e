//! Text generation backends for plot and screenplay writing.
//!
//! With `provider: auto` every configured backend is tried in order of
//! quality: Anthropic, then OpenAI, then the free Hugging Face inference
//! endpoint. Any other provider name pins a single backend.

use crate::core::config::Config;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    /// `auto`, `anthropic`, `openai` or `huggingface`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_retry_count")]
    pub retry_count: usize,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    /// Use a canned plot/script when every backend keeps failing.
    #[serde(default)]
    pub offline_fallback: bool,
    pub anthropic: Option<AnthropicConfig>,
    pub openai: Option<OpenAIConfig>,
    pub huggingface: Option<HuggingFaceConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_anthropic_url")]
    pub base_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_openai_url")]
    pub base_url: String,
}

/// The free tier works without a key.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HuggingFaceConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_hf_model")]
    pub model: String,
    #[serde(default = "default_hf_max_length")]
    pub max_length: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_hf_url")]
    pub base_url: String,
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_hf_model(),
            max_length: default_hf_max_length(),
            temperature: default_temperature(),
            base_url: default_hf_url(),
        }
    }
}

fn default_provider() -> String {
    "auto".to_string()
}
fn default_retry_count() -> usize {
    3
}
fn default_retry_delay() -> u64 {
    10
}
fn default_anthropic_model() -> String {
    "claude-3-sonnet-20240229".to_string()
}
fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_hf_model() -> String {
    "microsoft/DialoGPT-medium".to_string()
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_hf_max_length() -> u32 {
    1000
}
fn default_temperature() -> f32 {
    0.7
}
fn default_anthropic_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}
fn default_openai_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_hf_url() -> String {
    "https://api-inference.huggingface.co/models".to_string()
}

#[async_trait]
pub trait LlmClient: Send + Sync + Debug {
    async fn chat(&self, system: &str, user: &str) -> Result<String>;

    fn name(&self) -> &'static str {
        "llm"
    }
}

fn has_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Builds the text backend named by `llm.provider`.
pub fn create_llm(config: &Config) -> Result<Box<dyn LlmClient>> {
    let llm = &config.llm;
    let anthropic = || {
        llm.anthropic
            .as_ref()
            .filter(|c| has_key(&c.api_key))
            .map(|c| Box::new(AnthropicClient::new(c.clone())) as Box<dyn LlmClient>)
    };
    let openai = || {
        llm.openai
            .as_ref()
            .filter(|c| has_key(&c.api_key))
            .map(|c| Box::new(OpenAIClient::new(c.clone())) as Box<dyn LlmClient>)
    };
    let huggingface = || -> Box<dyn LlmClient> {
        Box::new(HuggingFaceClient::new(llm.huggingface.clone().unwrap_or_default()))
    };

    match llm.provider.to_ascii_lowercase().as_str() {
        "auto" => {
            let mut clients: Vec<Box<dyn LlmClient>> = Vec::new();
            clients.extend(anthropic());
            clients.extend(openai());
            clients.push(huggingface());
            Ok(Box::new(LlmChain::new(clients)))
        }
        "anthropic" | "claude" => anthropic().context("Anthropic config missing or has no api_key"),
        "openai" => openai().context("OpenAI config missing or has no api_key"),
        "huggingface" | "hf" => Ok(huggingface()),
        other => Err(anyhow!("Unknown LLM provider: {}", other)),
    }
}

/// Tries each backend in turn and returns the first non-empty reply.
#[derive(Debug)]
pub struct LlmChain {
    clients: Vec<Box<dyn LlmClient>>,
}

impl LlmChain {
    pub fn new(clients: Vec<Box<dyn LlmClient>>) -> Self {
        let names: Vec<&str> = clients.iter().map(|c| c.name()).collect();
        info!("Text generation chain: {}", names.join(" -> "));
        Self { clients }
    }
}

#[async_trait]
impl LlmClient for LlmChain {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let mut errors = Vec::new();
        for client in &self.clients {
            info!("Generating text with {}...", client.name());
            match client.chat(system, user).await {
                Ok(text) if !text.trim().is_empty() => return Ok(text),
                Ok(_) => errors.push(format!("{}: empty response", client.name())),
                Err(e) => {
                    warn!("{} failed: {:#}", client.name(), e);
                    errors.push(format!("{}: {:#}", client.name(), e));
                }
            }
        }
        bail!("All text generation providers failed ({})", errors.join("; "))
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}

/// Calls `chat`, retrying up to `retry_count` extra times with a fixed delay.
pub async fn chat_with_retry(
    llm: &dyn LlmClient,
    config: &LlmConfig,
    system: &str,
    user: &str,
) -> Result<String> {
    let mut attempt = 0;
    loop {
        match llm.chat(system, user).await {
            Ok(text) if !text.trim().is_empty() => return Ok(text),
            Ok(_) if attempt >= config.retry_count => {
                return Err(anyhow!("LLM returned an empty response"));
            }
            Err(e) if attempt >= config.retry_count => {
                return Err(e.context(format!("LLM failed after {} attempts", attempt + 1)));
            }
            Ok(_) => warn!("LLM returned an empty response, retrying ({}/{})", attempt + 1, config.retry_count),
            Err(e) => warn!("LLM error: {:#}. Retrying ({}/{})", e, attempt + 1, config.retry_count),
        }
        attempt += 1;
        if config.retry_delay_seconds > 0 {
            tokio::time::sleep(Duration::from_secs(config.retry_delay_seconds)).await;
        }
    }
}

async fn send_json<T: DeserializeOwned>(request: reqwest::RequestBuilder, provider: &str) -> Result<T> {
    let resp = request
        .send()
        .await
        .with_context(|| format!("{} request failed", provider))?;
    if !resp.status().is_success() {
        let status = resp.status();
        let error_text = resp.text().await.unwrap_or_default();
        bail!("{} API error ({}): {}", provider, status, error_text);
    }
    let body = resp.text().await?;
    serde_json::from_str(&body)
        .with_context(|| format!("Failed to parse {} response: {}", provider, body))
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

// --- Anthropic ---

#[derive(Debug)]
struct AnthropicClient {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicClient {
    fn new(config: AnthropicConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

impl AnthropicResponse {
    fn into_text(self) -> Result<String> {
        let text: String = self
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text.as_deref())
            .collect();
        if text.is_empty() {
            bail!("Anthropic response has no text block");
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let body = AnthropicRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system,
            messages: vec![ChatMessage { role: "user", content: user }],
        };
        let request = self
            .client
            .post(format!("{}/messages", self.config.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body);
        let result: AnthropicResponse = send_json(request, "Anthropic").await?;
        result.into_text()
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

// --- OpenAI ---

#[derive(Debug)]
struct OpenAIClient {
    config: OpenAIConfig,
    client: reqwest::Client,
}

impl OpenAIClient {
    fn new(config: OpenAIConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

impl OpenAIResponse {
    fn into_text(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("OpenAI response has no message content"))
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let body = OpenAIRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };
        let request = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&body);
        let result: OpenAIResponse = send_json(request, "OpenAI").await?;
        result.into_text()
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

// --- Hugging Face ---

#[derive(Debug)]
struct HuggingFaceClient {
    config: HuggingFaceConfig,
    client: reqwest::Client,
}

impl HuggingFaceClient {
    fn new(config: HuggingFaceConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct HfRequest {
    inputs: String,
    parameters: HfParameters,
}

#[derive(Serialize)]
struct HfParameters {
    max_length: u32,
    temperature: f32,
    do_sample: bool,
}

#[derive(Deserialize)]
struct HfGeneration {
    generated_text: Option<String>,
    text: Option<String>,
}

fn hf_text(generations: Vec<HfGeneration>) -> Result<String> {
    generations
        .into_iter()
        .next()
        .and_then(|g| g.generated_text.or(g.text))
        .ok_or_else(|| anyhow!("Hugging Face response has no generated text"))
}

#[async_trait]
impl LlmClient for HuggingFaceClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let body = HfRequest {
            inputs: format!("{}\n\n{}", system, user),
            parameters: HfParameters {
                max_length: self.config.max_length,
                temperature: self.config.temperature,
                do_sample: true,
            },
        };
        let mut request = self
            .client
            .post(format!(
                "{}/{}",
                self.config.base_url.trim_end_matches('/'),
                self.config.model
            ))
            .json(&body);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| has_key(k)) {
            request = request.bearer_auth(key);
        }
        let generations: Vec<HfGeneration> = send_json(request, "Hugging Face").await?;
        hf_text(generations)
    }

    fn name(&self) -> &'static str {
        "huggingface"
    }
}
