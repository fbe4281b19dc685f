//! OpenAI-compatible chat client for a local llama-server.
//!
//! One blocking round trip per call: build the message list, POST it to
//! `<base_url>/chat/completions` with bearer auth, and return the first
//! choice's content. No retries, no streaming.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable overriding the server base URL.
pub const BASE_URL_ENV: &str = "LLAMA_BASE_URL";

/// Environment variable overriding the API key.
pub const API_KEY_ENV: &str = "LLAMA_API_KEY";

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/v1";
// llama-server ignores the key unless started with --api-key
const DEFAULT_API_KEY: &str = "none";
const DEFAULT_MODEL: &str = "local";

/// Errors from chat completion round trips.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The HTTP request failed outright.
    #[error("chat request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("chat request returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The response carried no message content.
    #[error("response contained no message content")]
    MissingContent,

    /// The response carried no usage statistics.
    #[error("response contained no usage statistics")]
    MissingUsage,
}

/// A single chat message on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Parameters for one chat completion request.
///
/// ```
/// use local_llm::ChatRequest;
///
/// let request = ChatRequest::new("Label this row")
///     .system_prompt("You are an annotator")
///     .max_tokens(256)
///     .temperature(0.0);
/// ```
#[derive(Debug, Clone)]
pub struct ChatRequest {
    prompt: String,
    model: String,
    system_prompt: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    grammar: Option<String>,
}

impl ChatRequest {
    /// Create a request for `prompt` against the default model.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: None,
            max_tokens: None,
            temperature: None,
            grammar: None,
        }
    }

    /// Target a specific model name.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Prepend a system message.
    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Cap the number of generated tokens.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Constrain decoding with a raw GBNF grammar (llama-server extension).
    pub fn grammar(mut self, grammar: impl Into<String>) -> Self {
        self.grammar = Some(grammar.into());
        self
    }

    /// Messages in wire order: system first when present, then the user
    /// prompt.
    fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: self.prompt.clone(),
        });
        messages
    }

    fn payload(&self) -> ChatCompletionPayload {
        ChatCompletionPayload {
            model: self.model.clone(),
            messages: self.messages(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            grammar: self.grammar.clone(),
        }
    }
}

/// Body of a `/chat/completions` request.
#[derive(Debug, Serialize)]
struct ChatCompletionPayload {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    grammar: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
}

/// Client for a llama-server chat completion endpoint.
///
/// Stateless between calls; cheap to clone.
#[derive(Debug, Clone)]
pub struct ChatClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl ChatClient {
    /// Create a client for an explicit base URL and API key.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Build a client from `LLAMA_BASE_URL` / `LLAMA_API_KEY`, falling back
    /// to the local llama-server defaults.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let api_key = std::env::var(API_KEY_ENV).unwrap_or_else(|_| DEFAULT_API_KEY.to_string());
        Self::new(base_url, api_key)
    }

    /// Send a chat completion request and return the first choice's
    /// content, trimmed of surrounding whitespace.
    pub async fn chat(&self, request: &ChatRequest) -> Result<String, ClientError> {
        let response = self.post(&request.payload()).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ClientError::MissingContent)?;
        Ok(content.trim().to_string())
    }

    /// Count the prompt tokens for `prompt` without generating anything
    /// (prompt eval only: zero max tokens, zero temperature).
    pub async fn num_tokens(&self, prompt: &str, model: &str) -> Result<u32, ClientError> {
        let payload = ChatRequest::new(prompt)
            .model(model)
            .max_tokens(0)
            .temperature(0.0)
            .payload();
        let response = self.post(&payload).await?;
        response
            .usage
            .map(|usage| usage.prompt_tokens)
            .ok_or(ClientError::MissingUsage)
    }

    async fn post(
        &self,
        payload: &ChatCompletionPayload,
    ) -> Result<ChatCompletionResponse, ClientError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("sending chat completion request to {url}");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        Ok(response.json().await?)
    }
}
