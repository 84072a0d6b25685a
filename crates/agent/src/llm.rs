use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::time::sleep;

use coverwise_core::config::{AppConfig, LlmProvider};
use coverwise_core::plans::strip_code_fences;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
    /// Structured output constrained by a JSON schema.
    JsonSchema { name: String, schema: Value },
}

impl ResponseFormat {
    fn to_wire(&self) -> Option<Value> {
        match self {
            Self::Text => None,
            Self::JsonObject => Some(json!({ "type": "json_object" })),
            Self::JsonSchema { name, schema } => Some(json!({
                "type": "json_schema",
                "json_schema": { "name": name, "schema": schema, "strict": false },
            })),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub response_format: ResponseFormat,
    /// Overrides the client's configured temperature when set.
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, response_format: ResponseFormat) -> Self {
        Self { messages, response_format, temperature: None }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    #[error("provider returned status {code}: {body}")]
    Status { code: u16, body: String },
    #[error("provider returned an empty reply")]
    EmptyReply,
    #[error("malformed model reply: {0}")]
    MalformedReply(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout { .. } => true,
            Self::Status { code, .. } => *code == 429 || (500..=599).contains(code),
            Self::EmptyReply | Self::MalformedReply(_) => false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

#[async_trait]
impl<T> LlmClient for Arc<T>
where
    T: LlmClient + ?Sized,
{
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        (**self).complete(request).await
    }
}

/// Parses a model reply that is expected to hold a single JSON object.
pub fn parse_json_object(raw: &str) -> Result<Map<String, Value>, LlmError> {
    let cleaned = strip_code_fences(raw);
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(LlmError::MalformedReply(format!("expected a JSON object, got {other}"))),
        Err(error) => Err(LlmError::MalformedReply(error.to_string())),
    }
}

/// Chat-completions client for OpenAI and for Ollama's OpenAI-compatible endpoint.
pub struct OpenAiCompatibleClient {
    client: Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    temperature: f32,
    timeout: Duration,
    max_retries: u32,
    initial_backoff: Duration,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &AppConfig) -> Result<Self, LlmError> {
        let timeout = Duration::from_secs(config.llm.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            provider: config.llm.provider,
            base_url: config.llm_base_url().trim_end_matches('/').to_string(),
            model: config.llm.model.clone(),
            api_key: config.llm.api_key.clone(),
            temperature: config.llm.temperature,
            timeout,
            max_retries: config.llm.max_retries,
            initial_backoff: Duration::from_secs(1),
        })
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature.unwrap_or(self.temperature),
            "stream": false,
        });
        if let (Some(format), Some(object)) = (request.response_format.to_wire(), body.as_object_mut())
        {
            object.insert("response_format".to_string(), format);
        }
        body
    }

    async fn send_request(&self, request: &ChatRequest) -> Result<Response, LlmError> {
        let mut builder = self.client.post(self.completions_url()).json(&self.request_body(request));
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        builder.send().await.map_err(|error| {
            if error.is_timeout() {
                LlmError::Timeout { timeout_secs: self.timeout.as_secs() }
            } else if error.is_connect() {
                LlmError::Transport(format!("connection failed: {error}"))
            } else {
                LlmError::Transport(error.to_string())
            }
        })
    }

    async fn parse_response(&self, response: Response) -> Result<String, LlmError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { code: status.as_u16(), body });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|error| LlmError::MalformedReply(format!("failed to parse response: {error}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyReply)
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let mut attempt: u32 = 0;

        loop {
            let result = match self.send_request(request).await {
                Ok(response) => self.parse_response(response).await,
                Err(error) => Err(error),
            };

            match result {
                Ok(content) => return Ok(content),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    let delay = self.initial_backoff * (1 << attempt.min(6));
                    tracing::warn!(
                        event_name = "llm.retry",
                        provider = ?self.provider,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying chat completion"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}
