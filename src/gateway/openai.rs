//! OpenAI chat-completions adapter.
//!
//! One HTTP call per [`ChatRequest`], bounded by the request's time budget.
//! No retries here: callers decide whether a failed group or stage is worth
//! anything beyond a placeholder.

use std::env;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{ErrorContext, ProviderError};
use super::types::{ChatRequest, ChatResponse, Message};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Hard cap on response body size. Scoring responses are a few KB; anything
/// near this is the provider misbehaving.
const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

/// Low-level provider seam. [`OracleGateway`](super::OracleGateway) wraps an
/// implementation of this with usage recording.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Talks to an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .gzip(true)
            // Ceiling only; the per-request budget is applied per call.
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS * 2))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    /// Construct from `OPENAI_API_KEY`, `OPENAI_BASE_URL` and
    /// `OPENAI_TIMEOUT_SECONDS`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| ProviderError::config("OPENAI_API_KEY not set"))?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let timeout_secs = env::var("OPENAI_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let client = reqwest::Client::builder()
            .gzip(true)
            .timeout(Duration::from_secs(timeout_secs * 2))
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize, Default)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize, Default)]
struct WireChoice {
    #[serde(default)]
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct WireError {
    #[serde(default)]
    error: WireErrorBody,
}

#[derive(Deserialize, Default)]
struct WireErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}

#[async_trait]
impl ChatProvider for OpenAiAdapter {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = WireRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request
                .json_mode
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(request.time_budget)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(request.time_budget, None)
                } else {
                    ProviderError::Http(e)
                }
            })?;

        let status = response.status();
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(request.time_budget, None)
            } else {
                ProviderError::Http(e)
            }
        })?;
        if bytes.len() > MAX_RESPONSE_BYTES {
            return Err(ProviderError::unavailable(format!(
                "response body too large: {} bytes",
                bytes.len()
            )));
        }

        if !status.is_success() {
            let mut context = ErrorContext::new().with_status(status.as_u16());
            if let Some(id) = request_id {
                context = context.with_request_id(id);
            }
            let message = match serde_json::from_slice::<WireError>(&bytes) {
                Ok(wire) => {
                    if let Some(code) = wire.error.code {
                        context = context.with_code(code);
                    }
                    wire.error.message
                }
                Err(_) => String::from_utf8_lossy(&bytes).chars().take(200).collect(),
            };
            return Err(if status.as_u16() == 400 || status.as_u16() == 422 {
                ProviderError::InvalidRequest {
                    message,
                    context: Some(context),
                }
            } else {
                ProviderError::Unavailable {
                    message,
                    context: Some(context),
                }
            });
        }

        let wire: WireResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::unavailable(format!("malformed response body: {e}")))?;
        let choice = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::unavailable("response has no choices"))?;

        if let Some(refusal) = choice.message.refusal {
            return Err(ProviderError::refused(refusal));
        }
        let content = match choice.message.content {
            Some(c) if !c.trim().is_empty() => c,
            _ => return Err(ProviderError::refused("empty completion content")),
        };

        let latency = started.elapsed();
        debug!(
            model = %request.model,
            caller = request.attribution.caller,
            latency_ms = latency.as_millis() as u64,
            "oracle call complete"
        );

        Ok(ChatResponse {
            content,
            input_tokens: wire.usage.as_ref().and_then(|u| u.prompt_tokens),
            output_tokens: wire.usage.as_ref().and_then(|u| u.completion_tokens),
            latency,
            finish_reason: choice.finish_reason,
        })
    }
}
