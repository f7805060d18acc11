//! Shared test doubles.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use screenflow::gateway::{ChatGateway, ChatRequest, ChatResponse, ProviderError};

type Responder = dyn Fn(&ChatRequest) -> Result<String, ProviderError> + Send + Sync;

/// Scripted in-memory gateway with call accounting. `max_in_flight` records
/// the high-water mark of concurrent calls, which is what the concurrency
/// bound tests assert on.
pub struct FakeGateway {
    responder: Box<Responder>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeGateway {
    pub fn new(
        responder: impl Fn(&ChatRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_delay(responder, Duration::ZERO)
    }

    pub fn with_delay(
        responder: impl Fn(&ChatRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatGateway for FakeGateway {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = (self.responder)(&request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result.map(|content| ChatResponse {
            content,
            input_tokens: Some(100),
            output_tokens: Some(50),
            latency: self.delay,
            finish_reason: Some("stop".to_string()),
        })
    }
}

/// Pull the item ids out of a batch-scoring request by scanning the rendered
/// jobs JSON in the user message.
pub fn ids_in_request(request: &ChatRequest) -> Vec<String> {
    let mut ids = Vec::new();
    for message in &request.messages {
        let text = &message.content;
        let mut rest = text.as_str();
        while let Some(pos) = rest.find("\"id\": \"") {
            let tail = &rest[pos + 7..];
            if let Some(end) = tail.find('"') {
                ids.push(tail[..end].to_string());
                rest = &tail[end..];
            } else {
                break;
            }
        }
    }
    ids
}

/// A well-formed scoring response covering exactly `ids`.
pub fn scores_response(ids: &[String], score: u8) -> String {
    let entries: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| {
            serde_json::json!({
                "id": id,
                "score": score,
                "breakdown": {"skills": score, "experience": score, "education": score, "alignment": score},
                "strengths": ["relevant stack"],
                "gaps": [],
            })
        })
        .collect();
    serde_json::json!({ "scores": entries }).to_string()
}
