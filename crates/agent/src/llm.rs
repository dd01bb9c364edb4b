//! Chat-completion client for OpenAI-compatible endpoints.
//!
//! [`LlmClient`] is the seam the hosted model is written against;
//! [`OpenAiClient`] talks to `{base_url}/chat/completions`, which covers both
//! the OpenAI API and Ollama's compatibility endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use shopdesk_core::config::{LlmConfig, LlmProvider};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
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

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Asks the endpoint for a JSON object response.
    pub json_response: bool,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("llm quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("llm api returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("llm response was malformed: {0}")]
    MalformedResponse(String),
    #[error("llm client configuration invalid: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the text content of the first choice. An empty string means
    /// the model produced no content.
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<&SecretString>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(api_key) = api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
                .map_err(|error| {
                    LlmError::Configuration(format!("invalid api key header value: {error}"))
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|error| {
                LlmError::Configuration(format!("failed to build http client: {error}"))
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            max_retries: 1,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Builds a client for the configured provider, or `None` when the hosted
    /// model is disabled.
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>, LlmError> {
        if config.provider == LlmProvider::Disabled {
            return Ok(None);
        }
        let base_url = config
            .base_url
            .as_deref()
            .or_else(|| config.provider.default_base_url())
            .ok_or_else(|| LlmError::Configuration("llm base url is not set".to_string()))?;

        let client = Self::new(
            base_url,
            config.model.clone(),
            config.api_key.as_ref(),
            Duration::from_secs(config.timeout_secs.max(1)),
        )?
        .with_max_retries(config.max_retries);
        Ok(Some(client))
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let body = ChatCompletionBody {
            model: &self.model,
            messages: &request.messages,
            response_format: request.json_response.then_some(ResponseFormat { kind: "json_object" }),
            max_tokens: request.max_tokens,
        };

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(
                    event_name = "llm.request.retry",
                    attempt,
                    "retrying completion request after transient error"
                );
                tokio::time::sleep(self.retry_delay).await;
            }

            let response = self.client.post(&self.endpoint).json(&body).send().await?;
            let status = response.status();
            debug!(event_name = "llm.response.received", status = %status, attempt);

            if status.is_success() {
                let text = response.text().await?;
                let parsed: ChatCompletionResponse = serde_json::from_str(&text)
                    .map_err(|error| LlmError::MalformedResponse(error.to_string()))?;
                let choice = parsed.choices.into_iter().next().ok_or_else(|| {
                    LlmError::MalformedResponse("response contained no choices".to_string())
                })?;
                return Ok(choice.message.content.unwrap_or_default());
            }

            let text = response.text().await.unwrap_or_default();
            let api_error = serde_json::from_str::<ApiErrorResponse>(&text).ok();
            let message = api_error
                .as_ref()
                .map(|body| body.error.message.clone())
                .unwrap_or_else(|| text.clone());

            if api_error.as_ref().is_some_and(ApiErrorResponse::is_quota_exhausted) {
                warn!(
                    event_name = "llm.quota.exceeded",
                    status = %status,
                    "llm quota exhausted; not retrying"
                );
                return Err(LlmError::QuotaExceeded(message));
            }

            let error = LlmError::Api { status: status.as_u16(), message };
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(event_name = "llm.request.transient", status = %status, "transient error, will retry");
                last_error = Some(error);
                continue;
            }
            return Err(error);
        }

        Err(last_error.unwrap_or_else(|| LlmError::Api {
            status: 0,
            message: "completion request failed after retries".to_string(),
        }))
    }
}

fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503)
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl ApiErrorResponse {
    fn is_quota_exhausted(&self) -> bool {
        self.error.code.as_deref() == Some("insufficient_quota")
            || self.error.kind.as_deref() == Some("insufficient_quota")
    }
}
