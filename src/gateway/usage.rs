//! Per-call usage recording.
//!
//! Every oracle call produces one [`CallRecord`], success or failure. The sink
//! is a trait so deployments can forward records wherever they account for
//! spend; the library ships a no-op and a stderr line writer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Outcome of an oracle call, as seen by the usage sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Ok,
    Timeout,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Timeout => "timeout",
            Self::Error => "error",
        }
    }
}

/// One oracle call, attributed and timestamped.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub caller: &'static str,
    pub run_id: Option<Uuid>,
    pub status: CallStatus,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub latency: Duration,
}

impl CallRecord {
    pub fn new(model: impl Into<String>, caller: &'static str, status: CallStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            model: model.into(),
            caller,
            run_id: None,
            status,
            input_tokens: None,
            output_tokens: None,
            latency: Duration::ZERO,
        }
    }

    pub fn with_run_id(mut self, run_id: Option<Uuid>) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_tokens(mut self, input: Option<u32>, output: Option<u32>) -> Self {
        self.input_tokens = input;
        self.output_tokens = output;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

/// Destination for call records. Implementations must not fail the call path.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record(&self, record: CallRecord);
}

/// Discards all records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageSink;

#[async_trait]
impl UsageSink for NoopUsageSink {
    async fn record(&self, _record: CallRecord) {}
}

/// Writes one line per call to stderr. Useful for CLI runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrUsageSink;

#[async_trait]
impl UsageSink for StderrUsageSink {
    async fn record(&self, record: CallRecord) {
        eprintln!(
            "[usage] {} model={} caller={} status={} in={} out={} latency_ms={}",
            record.timestamp.to_rfc3339(),
            record.model,
            record.caller,
            record.status.as_str(),
            record.input_tokens.map_or_else(|| "-".into(), |t| t.to_string()),
            record.output_tokens.map_or_else(|| "-".into(), |t| t.to_string()),
            record.latency.as_millis(),
        );
    }
}
