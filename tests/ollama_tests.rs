//! Integration tests for the Ollama client
//!
//! An in-process axum server stands in for `/api/generate`.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use cody::metrics::MODEL_TOKENS_TOTAL;
use cody::ollama::{ModelError, OllamaClient};
use cody::router::{ChatProvider, ModelRequest};

#[derive(Clone, Default)]
struct Seen {
    body: Arc<Mutex<Option<Value>>>,
    trace_id: Arc<Mutex<Option<String>>>,
}

/// Serve `app` on an ephemeral port and return its base URL
async fn spawn_server(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Fake endpoint that answers every request with `reply` and records it
async fn recording_server(reply: Value) -> (String, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route(
            "/api/generate",
            post(
                move |State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>| {
                    let reply = reply.clone();
                    async move {
                        *seen.body.lock().unwrap() = Some(body);
                        *seen.trace_id.lock().unwrap() = headers
                            .get("x-trace-id")
                            .and_then(|v| v.to_str().ok())
                            .map(String::from);
                        Json(reply)
                    }
                },
            ),
        )
        .with_state(seen.clone());
    (spawn_server(app).await, seen)
}

fn request() -> ModelRequest {
    ModelRequest::new("deepseek-coder:6.7b", "Explain recursion")
        .with_system("Be brief.")
        .with_trace_id("trace-1")
}

fn client(base_url: &str) -> OllamaClient {
    OllamaClient::new(Some(base_url.to_string()), Duration::from_secs(5))
}

#[tokio::test]
async fn test_generate_sends_expected_body() {
    let (url, seen) = recording_server(json!({
        "model": "deepseek-coder:6.7b",
        "response": "Recursion is a function calling itself.",
        "done": true,
        "eval_count": 9,
        "prompt_eval_count": 4,
        "eval_duration": 1200
    }))
    .await;

    let generated = client(&url).generate(&request()).await.unwrap();
    assert_eq!(generated.response, "Recursion is a function calling itself.");
    assert_eq!(generated.eval_count, 9);
    assert_eq!(generated.prompt_eval_count, 4);
    assert_eq!(generated.eval_duration_ns, 1200);

    let body = seen.body.lock().unwrap().clone().unwrap();
    assert_eq!(body["model"], "deepseek-coder:6.7b");
    assert_eq!(body["prompt"], "Explain recursion");
    assert_eq!(body["stream"], false);
    assert_eq!(body["system"], "Be brief.");
    assert_eq!(seen.trace_id.lock().unwrap().as_deref(), Some("trace-1"));
}

#[tokio::test]
async fn test_chat_returns_reply() {
    let (url, _seen) = recording_server(json!({ "response": "text" })).await;
    // trailing slash must not produce `//api/generate`
    let client = client(&format!("{}/", url));

    assert_eq!(client.chat(&request()).await.as_deref(), Some("text"));
}

/// Token counts from a successful reply are recorded per model
#[tokio::test]
async fn test_chat_records_token_usage() {
    let (url, _seen) = recording_server(json!({
        "response": "text",
        "eval_count": 12,
        "prompt_eval_count": 5,
        "eval_duration": 600_000_000u64
    }))
    .await;
    let request = ModelRequest::new("usage-test-model:1b", "hello");

    assert_eq!(client(&url).chat(&request).await.as_deref(), Some("text"));
    assert_eq!(client(&url).chat(&request).await.as_deref(), Some("text"));

    let tokens = |kind: &str| MODEL_TOKENS_TOTAL.with_label_values(&["usage-test-model:1b", kind]).get();
    assert_eq!(tokens("prompt"), 10.0);
    assert_eq!(tokens("generated"), 24.0);
}

#[tokio::test]
async fn test_malformed_body_is_no_reply() {
    let (url, _seen) = recording_server(json!({ "unexpected": true })).await;
    let client = client(&url);

    let err = client.generate(&request()).await.unwrap_err();
    assert!(matches!(err, ModelError::Decode(_)), "got {:?}", err);
    assert_eq!(client.chat(&request()).await, None);
}

#[tokio::test]
async fn test_blank_reply_is_no_reply() {
    let (url, _seen) = recording_server(json!({ "response": "  \n" })).await;
    assert_eq!(client(&url).chat(&request()).await, None);
}

#[tokio::test]
async fn test_error_status_is_no_reply() {
    let app = Router::new().route(
        "/api/generate",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed") }),
    );
    let url = spawn_server(app).await;
    let client = client(&url);

    let err = client.generate(&request()).await.unwrap_err();
    assert!(matches!(err, ModelError::Status(500)), "got {:?}", err);
    assert_eq!(client.chat(&request()).await, None);
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let app = Router::new().route(
        "/api/generate",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({ "response": "too late" }))
        }),
    );
    let url = spawn_server(app).await;
    let client = OllamaClient::new(Some(url), Duration::from_millis(200));

    let start = Instant::now();
    assert_eq!(client.chat(&request()).await, None);
    assert!(start.elapsed() < Duration::from_secs(3));

    match client.generate(&request()).await {
        Err(ModelError::Transport(e)) => assert!(e.is_timeout()),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_is_no_reply() {
    // Grab a free port, then close it so nothing is listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client(&format!("http://{}", addr));
    assert!(matches!(
        client.generate(&request()).await,
        Err(ModelError::Transport(_))
    ));
    assert_eq!(client.chat(&request()).await, None);
}

#[tokio::test]
async fn test_unconfigured_client_never_calls_out() {
    let client = OllamaClient::unconfigured();
    assert!(!client.is_configured());
    assert!(matches!(
        client.generate(&request()).await,
        Err(ModelError::NotConfigured)
    ));
    assert_eq!(client.chat(&request()).await, None);
}
