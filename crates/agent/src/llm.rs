use std::collections::VecDeque;
use std::time::Duration;

use agentpay_core::config::{LlmConfig, LlmProvider};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 2048;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Chat completion client for OpenAI-compatible endpoints and Anthropic.
pub struct HttpLlmClient {
    http: Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build LLM HTTP client")?;

        Ok(Self {
            http,
            provider: config.provider,
            base_url: config.effective_base_url().trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    async fn complete_openai(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = OpenAiRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: 0.0,
        };

        let mut request = self.http.post(&url).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.context("failed to send chat completion request")?;
        let status = response.status();
        let text = response.text().await.context("failed to read chat completion response")?;
        if !status.is_success() {
            bail!("chat completion endpoint returned {status}: {}", truncate(&text, 300));
        }

        let parsed: OpenAiResponse = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse chat completion: {}", truncate(&text, 300)))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("chat completion returned no content"))
    }

    async fn complete_anthropic(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: MAX_OUTPUT_TOKENS,
            messages: vec![ChatMessage { role: "user", content: prompt }],
        };
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("anthropic provider requires an api key"))?;

        let response = self
            .http
            .post(&url)
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("failed to send messages request")?;
        let status = response.status();
        let text = response.text().await.context("failed to read messages response")?;
        if !status.is_success() {
            bail!("messages endpoint returned {status}: {}", truncate(&text, 300));
        }

        let parsed: AnthropicResponse = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse messages response: {}", truncate(&text, 300)))?;
        let content = parsed
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        if content.is_empty() {
            bail!("messages response returned no text content");
        }
        Ok(content)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(
            event_name = "agent.llm.request",
            provider = ?self.provider,
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            "sending completion request"
        );

        match self.provider {
            LlmProvider::OpenAi | LlmProvider::Ollama => self.complete_openai(prompt).await,
            LlmProvider::Anthropic => self.complete_anthropic(prompt).await,
        }
    }
}

/// Replays queued completions in order and remembers every prompt it saw.
#[derive(Default)]
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|text| Ok(text.into())).collect()),
            prompts: Mutex::default(),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self { responses: Mutex::new(VecDeque::from([Err(message.into())])), prompts: Mutex::default() }
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().await.push(prompt.to_string());
        match self.responses.lock().await.pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => bail!("no scripted completion left"),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
