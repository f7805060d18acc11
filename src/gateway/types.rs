//! Request and response types for oracle chat calls.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who is making this call, threaded through to the usage sink.
#[derive(Debug, Clone)]
pub struct Attribution {
    /// Stable caller path, e.g. "batch.score" or "prep.company_research".
    pub caller: &'static str,
    /// Run this call belongs to, when issued from inside a pipeline run.
    pub run_id: Option<Uuid>,
}

impl Attribution {
    pub fn new(caller: &'static str) -> Self {
        Self {
            caller,
            run_id: None,
        }
    }

    pub fn for_run(caller: &'static str, run_id: Uuid) -> Self {
        Self {
            caller,
            run_id: Some(run_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A single chat-completion request.
///
/// `time_budget` bounds the whole call; the adapter maps expiry to
/// `ProviderError::Timeout`. There is no retry below this type - callers own
/// recovery.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Ask the provider for a JSON object response.
    pub json_mode: bool,
    pub time_budget: Duration,
    pub attribution: Attribution,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>, attribution: Attribution) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.3,
            max_tokens: None,
            json_mode: false,
            time_budget: Duration::from_secs(120),
            attribution,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = budget;
        self
    }
}

/// A completed chat call.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub latency: Duration,
    pub finish_reason: Option<String>,
}
