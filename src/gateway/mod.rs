//! Oracle gateway: the one seam through which every model call flows.
//!
//! [`ChatGateway`] is the trait callers hold (as `Arc<dyn ChatGateway>`);
//! [`OracleGateway`] is the shipped implementation, pairing a provider
//! adapter with a usage sink. The gateway never retries: a failed call is
//! returned to the caller, which substitutes placeholders or defaults.

mod error;
mod openai;
mod types;
mod usage;

pub use error::{ErrorContext, ProviderError};
pub use openai::{ChatProvider, OpenAiAdapter};
pub use types::{Attribution, ChatRequest, ChatResponse, Message, Role};
pub use usage::{CallRecord, CallStatus, NoopUsageSink, StderrUsageSink, UsageSink};

use std::sync::Arc;

use async_trait::async_trait;

/// The oracle call seam. Tests substitute deterministic fakes.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Provider adapter plus usage recording.
pub struct OracleGateway {
    provider: Arc<dyn ChatProvider>,
    usage: Arc<dyn UsageSink>,
}

impl OracleGateway {
    pub fn new(provider: Arc<dyn ChatProvider>, usage: Arc<dyn UsageSink>) -> Self {
        Self { provider, usage }
    }

    /// Gateway over the OpenAI adapter configured from the environment, with
    /// usage lines on stderr.
    pub fn from_env() -> Result<Self, ProviderError> {
        Ok(Self::new(
            Arc::new(OpenAiAdapter::from_env()?),
            Arc::new(StderrUsageSink),
        ))
    }
}

#[async_trait]
impl ChatGateway for OracleGateway {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let model = request.model.clone();
        let caller = request.attribution.caller;
        let run_id = request.attribution.run_id;

        let result = self.provider.complete(&request).await;

        let record = match &result {
            Ok(response) => CallRecord::new(model, caller, CallStatus::Ok)
                .with_run_id(run_id)
                .with_tokens(response.input_tokens, response.output_tokens)
                .with_latency(response.latency),
            Err(e) if e.is_timeout() => {
                CallRecord::new(model, caller, CallStatus::Timeout).with_run_id(run_id)
            }
            Err(_) => CallRecord::new(model, caller, CallStatus::Error).with_run_id(run_id),
        };
        self.usage.record(record).await;

        result
    }
}
