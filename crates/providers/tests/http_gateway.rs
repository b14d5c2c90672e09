//! HttpGateway against a scripted local backend.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use shellpilot_config::{AppConfig, ExtraBackend};
use shellpilot_core::call::{CallDescriptor, RequestKind};
use shellpilot_core::error::ProviderError;
use shellpilot_core::gateway::{Gateway, drain_stream};
use shellpilot_core::response::keys;
use shellpilot_providers::HttpGateway;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

type Hits = Arc<AtomicUsize>;

async fn chat(State(hits): State<Hits>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer sk-test") {
        return (StatusCode::UNAUTHORIZED, "bad key").into_response();
    }

    if body["stream"] == true {
        let chunks: Vec<String> = ["Hel", "lo"]
            .iter()
            .map(|t| {
                json!({"id": "chatcmpl-stream", "object": "chat.completion.chunk",
                       "choices": [{"index": 0, "delta": {"content": t}}]})
                .to_string()
            })
            .chain(std::iter::once("[DONE]".to_string()))
            .collect();
        let events = chunks
            .into_iter()
            .map(|data| Ok::<_, Infallible>(SseEvent::default().data(data)));
        return Sse::new(tokio_stream::iter(events)).into_response();
    }

    Json(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": body["model"],
        "choices": [{"index": 0, "finish_reason": "stop",
                     "message": {"role": "assistant", "content": body["messages"][1]["content"]}}],
        "usage": {"prompt_tokens": 7, "completion_tokens": 2, "total_tokens": 9}
    }))
    .into_response()
}

async fn responses(State(hits): State<Hits>, Json(body): Json<Value>) -> Json<Value> {
    hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "id": "resp_2",
        "object": "response",
        "model": body["model"],
        "previous_response_id": body["previous_response_id"],
        "max_output_tokens": body["max_output_tokens"],
        "output": [{"type": "local_shell_call", "call_id": "call_1",
                    "action": {"command": ["echo", "hi"]}}],
        "metadata": {"local_shell_command_sequence_finished": false}
    }))
}

async fn throttled(State(hits): State<Hits>) -> (StatusCode, &'static str) {
    hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::TOO_MANY_REQUESTS, "slow down")
}

async fn spawn_backend() -> (String, Hits) {
    let hits: Hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/v1/chat/completions", post(chat))
        .route("/v1/responses", post(responses))
        .route("/throttled/chat/completions", post(throttled))
        .with_state(hits.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), hits)
}

fn gateway_for(base: &str) -> HttpGateway {
    let mut config = AppConfig::default();
    config.provider.extra_backends.push(ExtraBackend {
        name: "scripted".into(),
        url_prefix: base.to_string(),
        api_key_env: Some("SCRIPTED_API_KEY".into()),
    });
    HttpGateway::from_config(&config)
        .unwrap()
        .with_credentials(|var| (var == "SCRIPTED_API_KEY").then(|| "sk-test".to_string()))
}

#[tokio::test]
async fn buffered_completion_round_trip() {
    let (base, hits) = spawn_backend().await;
    let call = CallDescriptor::builder("gpt-4o", format!("{base}/v1/chat/completions"), RequestKind::Completion)
        .instructions("be brief")
        .content("say hello")
        .build();

    let resp = gateway_for(&base).complete_request(&call).await.unwrap();
    assert_eq!(resp.output_text(), Some("say hello"));
    assert_eq!(resp.get_str(keys::MODEL), Some("gpt-4o"));
    assert_eq!(resp.usage().total_tokens, Some(9));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn streaming_assembles_deltas() {
    let (base, _) = spawn_backend().await;
    let call = CallDescriptor::builder("gpt-4o", format!("{base}/v1/chat/completions"), RequestKind::Completion)
        .content("stream please")
        .streaming(true)
        .build();

    let stream = gateway_for(&base).stream_request(&call).await.unwrap();
    let mut deltas = Vec::new();
    let resp = drain_stream(stream, |d| deltas.push(d.to_string())).await.unwrap();
    assert_eq!(deltas, vec!["Hel", "lo"]);
    assert_eq!(resp.output_text(), Some("Hello"));
    assert_eq!(resp.response_id(), Some("chatcmpl-stream"));
}

#[tokio::test]
async fn responses_kind_threads_previous_id() {
    let (base, _) = spawn_backend().await;
    let call = CallDescriptor::builder("gpt-4.1", format!("{base}/v1/responses"), RequestKind::Responses)
        .content("[User]: list\n")
        .previous_response_id(Some("resp_1"))
        .build();

    let resp = gateway_for(&base).complete_request(&call).await.unwrap();
    assert_eq!(resp.get_str(keys::PREVIOUS_RESPONSE_ID), Some("resp_1"));
    assert!(resp.get_i64(keys::MAX_OUTPUT_TOKENS).unwrap() >= 16);
    assert_eq!(resp.shell_commands(), ["echo hi"]);
}

#[tokio::test]
async fn non_success_status_is_transport_error() {
    let (base, _) = spawn_backend().await;
    let call = CallDescriptor::builder("gpt-4o", format!("{base}/throttled/chat/completions"), RequestKind::Completion)
        .content("hi")
        .build();

    let err = gateway_for(&base).complete_request(&call).await.unwrap_err();
    match &err {
        ProviderError::Transport { status_code, body } => {
            assert_eq!(*status_code, 429);
            assert_eq!(body, "slow down");
        }
        other => panic!("expected transport error, got {other:?}"),
    }
    assert_eq!(err.to_string(), "Unexpected response code: 429, body: slow down");
}

#[tokio::test]
async fn missing_credential_sends_nothing() {
    let (base, hits) = spawn_backend().await;
    let gateway = gateway_for(&base).with_credentials(|_| None);
    let call = CallDescriptor::builder("gpt-4o", format!("{base}/v1/chat/completions"), RequestKind::Completion)
        .content("hi")
        .build();

    let err = gateway.complete_request(&call).await.unwrap_err();
    assert!(matches!(err, ProviderError::MissingCredential { ref env_var } if env_var == "SCRIPTED_API_KEY"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
