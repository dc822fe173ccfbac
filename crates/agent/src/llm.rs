use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use crmcrew_core::config::{LlmConfig, LlmProvider};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A single-shot chat completion: one system message, one user message, one answer.
///
/// Implementations never retry. Transport, auth, quota and decoding failures are
/// returned to the caller as-is.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> LlmProvider;

    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Generation settings shared by every provider client.
#[derive(Clone, Debug, PartialEq)]
pub struct Generation {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&LlmConfig> for Generation {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    generation: Generation,
}

impl OpenAiClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: SecretString,
        generation: Generation,
    ) -> Self {
        Self { http, base_url: base_url.into(), api_key, generation }
    }

    fn request_body(&self, system: &str, prompt: &str) -> Value {
        json!({
            "model": &self.generation.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt}
            ],
            "temperature": self.generation.temperature,
            "max_tokens": self.generation.max_tokens
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn provider(&self) -> LlmProvider {
        LlmProvider::OpenAi
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/chat/completions", trim_base(&self.base_url)))
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.request_body(system, prompt))
            .send()
            .await
            .context("OpenAI request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error {}: {}", status, body));
        }

        let body: Value = response.json().await.context("OpenAI returned a malformed body")?;
        parse_openai(body)
    }
}

fn parse_openai(body: Value) -> Result<String> {
    #[derive(Deserialize)]
    struct Message {
        content: Option<String>,
    }
    #[derive(Deserialize)]
    struct Choice {
        message: Message,
    }
    #[derive(Deserialize)]
    struct ApiResponse {
        choices: Vec<Choice>,
    }

    let parsed: ApiResponse =
        serde_json::from_value(body).context("OpenAI response did not match the chat schema")?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| anyhow!("OpenAI returned no choices"))
}

/// Anthropic `/messages` endpoint.
pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    generation: Generation,
}

impl AnthropicClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: SecretString,
        generation: Generation,
    ) -> Self {
        Self { http, base_url: base_url.into(), api_key, generation }
    }

    fn request_body(&self, system: &str, prompt: &str) -> Value {
        json!({
            "model": &self.generation.model,
            "max_tokens": self.generation.max_tokens,
            "temperature": self.generation.temperature,
            "system": system,
            "messages": [
                {"role": "user", "content": prompt}
            ]
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> LlmProvider {
        LlmProvider::Anthropic
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/messages", trim_base(&self.base_url)))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.request_body(system, prompt))
            .send()
            .await
            .context("Anthropic request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Anthropic API error {}: {}", status, body));
        }

        let body: Value = response.json().await.context("Anthropic returned a malformed body")?;
        parse_anthropic(body)
    }
}

fn parse_anthropic(body: Value) -> Result<String> {
    #[derive(Deserialize)]
    struct ContentBlock {
        #[serde(rename = "type")]
        kind: String,
        text: Option<String>,
    }
    #[derive(Deserialize)]
    struct ApiResponse {
        content: Vec<ContentBlock>,
    }

    let parsed: ApiResponse = serde_json::from_value(body)
        .context("Anthropic response did not match the messages schema")?;
    parsed
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
        .ok_or_else(|| anyhow!("Anthropic returned no text content"))
}

/// Ollama `/api/chat` endpoint, non-streaming.
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    generation: Generation,
}

impl OllamaClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, generation: Generation) -> Self {
        Self { http, base_url: base_url.into(), generation }
    }

    fn request_body(&self, system: &str, prompt: &str) -> Value {
        json!({
            "model": &self.generation.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt}
            ],
            "stream": false,
            "options": {
                "temperature": self.generation.temperature,
                "num_predict": self.generation.max_tokens
            }
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn provider(&self) -> LlmProvider {
        LlmProvider::Ollama
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/api/chat", trim_base(&self.base_url)))
            .json(&self.request_body(system, prompt))
            .send()
            .await
            .context("Ollama request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Ollama API error {}: {}", status, body));
        }

        let body: Value = response.json().await.context("Ollama returned a malformed body")?;
        parse_ollama(body)
    }
}

fn parse_ollama(body: Value) -> Result<String> {
    #[derive(Deserialize)]
    struct Message {
        content: String,
    }
    #[derive(Deserialize)]
    struct ApiResponse {
        message: Message,
    }

    let parsed: ApiResponse =
        serde_json::from_value(body).context("Ollama response did not match the chat schema")?;
    Ok(parsed.message.content)
}

fn trim_base(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

/// Builds the configured provider client with the configured request timeout.
pub fn client_from_config(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;
    let generation = Generation::from(config);
    let base_url = config.endpoint().to_string();

    tracing::debug!(
        event_name = "llm.client_built",
        provider = config.provider.as_str(),
        model = %config.model,
        endpoint = %base_url,
        "model provider client ready"
    );

    match config.provider {
        LlmProvider::OpenAi => {
            let api_key = require_key(config)?;
            Ok(Box::new(OpenAiClient::new(http, base_url, api_key, generation)))
        }
        LlmProvider::Anthropic => {
            let api_key = require_key(config)?;
            Ok(Box::new(AnthropicClient::new(http, base_url, api_key, generation)))
        }
        LlmProvider::Ollama => Ok(Box::new(OllamaClient::new(http, base_url, generation))),
    }
}

fn require_key(config: &LlmConfig) -> Result<SecretString> {
    config
        .api_key
        .as_ref()
        .map(|key| SecretString::from(key.expose_secret().to_owned()))
        .ok_or_else(|| anyhow!("llm.api_key is required for provider `{}`", config.provider))
}
