//! Adapter behavior against a scripted chat-completions server, plus one
//! end-to-end batch run through the real gateway stack.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use screenflow::batch::{score_batch, BatchOptions, Profile, WorkItem};
use screenflow::gateway::{
    Attribution, ChatProvider, ChatRequest, Message, NoopUsageSink, OpenAiAdapter, OracleGateway,
    ProviderError,
};

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 120, "completion_tokens": 40}
    })
}

fn request(budget_secs: u64) -> ChatRequest {
    ChatRequest::new(
        "gpt-4o-mini",
        vec![Message::user("hello")],
        Attribution::new("test"),
    )
    .with_json_mode()
    .with_time_budget(Duration::from_secs(budget_secs))
}

#[tokio::test]
async fn successful_call_maps_content_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("{\"ok\": true}")))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new("test-key", server.uri()).unwrap();
    let response = adapter.complete(&request(30)).await.unwrap();

    assert_eq!(response.content, "{\"ok\": true}");
    assert_eq!(response.input_tokens, Some(120));
    assert_eq!(response.output_tokens, Some(40));
    assert_eq!(response.finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn server_error_maps_to_unavailable_with_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(json!({"error": {"message": "overloaded", "code": "server_overloaded"}})),
        )
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new("test-key", server.uri()).unwrap();
    let err = adapter.complete(&request(30)).await.unwrap_err();

    match &err {
        ProviderError::Unavailable { message, context } => {
            assert_eq!(message, "overloaded");
            let context = context.as_ref().unwrap();
            assert_eq!(context.http_status, Some(503));
            assert_eq!(context.provider_code.as_deref(), Some("server_overloaded"));
        }
        other => panic!("expected Unavailable, got {other:?}"),
    }
    assert_eq!(err.code(), "oracle_unavailable");
}

#[tokio::test]
async fn bad_request_maps_to_invalid_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"error": {"message": "bad model", "code": "model_not_found"}})),
        )
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new("test-key", server.uri()).unwrap();
    let err = adapter.complete(&request(30)).await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidRequest { .. }));
}

#[tokio::test]
async fn refusal_field_maps_to_refused() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": null, "refusal": "cannot help"},
                "finish_reason": "stop"
            }]
        })))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new("test-key", server.uri()).unwrap();
    let err = adapter.complete(&request(30)).await.unwrap_err();
    assert!(matches!(err, ProviderError::Refused { .. }));
    assert_eq!(err.code(), "refused");
}

#[tokio::test]
async fn slow_server_maps_to_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("late"))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new("test-key", server.uri()).unwrap();
    let req = request(30).with_time_budget(Duration::from_millis(200));
    let err = adapter.complete(&req).await.unwrap_err();
    assert!(err.is_timeout());
}

/// Answers each scoring request with scores for the ids it finds in the body.
struct EchoScores;

impl Respond for EchoScores {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body = String::from_utf8_lossy(&request.body);
        let mut ids = Vec::new();
        let mut rest: &str = &body;
        // Ids arrive JSON-escaped inside the user message.
        while let Some(pos) = rest.find("\\\"id\\\": \\\"") {
            let tail = &rest[pos + 10..];
            if let Some(end) = tail.find('\\') {
                ids.push(tail[..end].to_string());
                rest = &tail[end..];
            } else {
                break;
            }
        }
        let entries: Vec<serde_json::Value> = ids
            .iter()
            .map(|id| json!({"id": id, "score": 73, "strengths": [], "gaps": []}))
            .collect();
        let content = json!({"scores": entries}).to_string();
        ResponseTemplate::new(200).set_body_json(completion_body(&content))
    }
}

#[tokio::test]
async fn end_to_end_batch_scoring_through_the_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(EchoScores)
        .expect(2)
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new("test-key", server.uri()).unwrap();
    let gateway = Arc::new(OracleGateway::new(Arc::new(adapter), Arc::new(NoopUsageSink)));

    let items: Vec<WorkItem> = (0..6)
        .map(|i| WorkItem {
            id: format!("job-{i}"),
            fields: serde_json::Map::new(),
        })
        .collect();
    let outcome = score_batch(
        gateway,
        &Profile::default(),
        items,
        BatchOptions {
            group_size: 3,
            max_concurrency: 2,
            ..BatchOptions::default()
        },
    )
    .await;

    assert_eq!(outcome.results.len(), 6);
    assert_eq!(outcome.degraded_groups, 0);
    assert!(outcome.results.iter().all(|r| r.score == 73));
}
