//! OpenAI-compatible chat-completions backend.

use crate::backend::{Completion, CompletionBackend};
use crate::error::LlmError;
use crate::tool::ToolDefinition;
use aibot_core::Message;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument};

/// Connection settings for an OpenAI-compatible API.
#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Base URL of the API, up to and including the version segment.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token.
    #[serde(default)]
    pub api_key: String,
    /// Model identifier.
    #[serde(default)]
    pub model: String,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl OpenAiConfig {
    /// Creates a configuration against the default base URL.
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: default_base_url(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Points the configuration at another compatible endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTool<'a>>,
}

#[derive(Debug, Serialize)]
struct FunctionTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<Message>,
}

fn request_body<'a>(
    model: &'a str,
    transcript: &'a [Message],
    tools: &'a [ToolDefinition],
) -> ChatCompletionRequest<'a> {
    ChatCompletionRequest {
        model,
        messages: transcript,
        tools: tools
            .iter()
            .map(|function| FunctionTool {
                kind: "function",
                function,
            })
            .collect(),
    }
}

fn parse_response(body: &[u8]) -> Result<Completion, Report<LlmError>> {
    let parsed: ChatCompletionResponse =
        serde_json::from_slice(body).map_err(|e| LlmError::ResponseParseFailed {
            reason: e.to_string(),
        })?;
    Ok(Completion {
        message: parsed.choices.into_iter().next().and_then(|c| c.message),
    })
}

/// Backend speaking the chat-completions protocol over HTTP.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    /// Creates a backend.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::InvalidConfig`] if the key or model is missing or
    /// the HTTP client cannot be built.
    pub fn new(config: OpenAiConfig) -> Result<Self, Report<LlmError>> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::InvalidConfig {
                reason: "api_key is required".to_string(),
            }
            .into());
        }
        if config.model.trim().is_empty() {
            return Err(LlmError::InvalidConfig {
                reason: "model is required".to_string(),
            }
            .into());
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::InvalidConfig {
                reason: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    /// Returns the configured model.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    #[instrument(skip_all, fields(model = %self.config.model, messages = transcript.len()))]
    async fn complete(
        &self,
        transcript: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Completion, Report<LlmError>> {
        let body = request_body(&self.config.model, transcript, tools);
        let response = self
            .client
            .post(self.config.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse().ok());
            return Err(LlmError::RateLimited { retry_after_secs }.into());
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                reason: format!("status {status}: {detail}"),
            }
            .into());
        }

        let bytes = response.bytes().await.map_err(|e| LlmError::RequestFailed {
            reason: e.to_string(),
        })?;
        debug!(bytes = bytes.len(), "completion received");
        parse_response(&bytes)
    }
}
