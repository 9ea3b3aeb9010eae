//! HTTP front end
//!
//! Routes:
//! - `GET /` - minimal chat page
//! - `GET /health` - liveness
//! - `GET /status` - all phase statuses
//! - `POST /chat` - `{message}` in, `ChatResult` out
//! - `GET /metrics` - Prometheus text exposition

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

use super::{ProtocolError, ServiceContext};
use crate::metrics;
use crate::router::ChatRequest;
use crate::status;

/// Recipient tag for requests arriving over HTTP
pub const HTTP_RECIPIENT: &str = "http";

/// Header a caller may set to pick its own trace ID
pub const TRACE_ID_HEADER: &str = "x-trace-id";

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
}

/// Create the HTTP router
pub fn create_router(ctx: ServiceContext) -> Router {
    Router::new()
        .route("/", get(chat_page))
        .route("/health", get(health))
        .route("/status", get(status_report))
        .route("/chat", post(chat))
        .route("/metrics", get(prometheus_metrics))
        .with_state(ctx)
}

pub async fn serve(listener: TcpListener, ctx: ServiceContext) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "HTTP server listening");
    axum::serve(listener, create_router(ctx)).await
}

async fn chat_page() -> Html<&'static str> {
    Html(CHAT_HTML)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "cody" }))
}

async fn status_report(State(ctx): State<ServiceContext>) -> impl IntoResponse {
    Json(status::status_report(&ctx.changelog))
}

async fn chat(
    State(ctx): State<ServiceContext>,
    headers: HeaderMap,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            let mut response = ProtocolError::InvalidJson.to_response();
            response["message"] = rejection.body_text().into();
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    let mut request = ChatRequest::new(body.message).with_recipient(HTTP_RECIPIENT);
    if let Some(trace_id) = headers.get(TRACE_ID_HEADER).and_then(|v| v.to_str().ok()) {
        request = request.with_request_id(trace_id);
    }

    let router = ctx.routers.resolve();
    Json(router.route_chat(request).await).into_response()
}

async fn prometheus_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_text(),
    )
}

const CHAT_HTML: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Cody</title>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #0a0a0a;
            color: #e0e0e0;
            min-height: 100vh;
            padding: 2rem;
        }
        h1 { color: #00ff88; font-size: 1.5rem; margin-bottom: 1rem; }
        #log {
            max-width: 800px;
            background: #1a1a1a;
            border: 1px solid #333;
            border-radius: 12px;
            padding: 1rem;
            min-height: 300px;
            margin-bottom: 1rem;
        }
        .msg { padding: 0.5rem 0; border-bottom: 1px solid #222; white-space: pre-wrap; }
        .msg .who { color: #888; margin-right: 0.5rem; }
        .badge { color: #ffaa00; font-size: 0.75rem; margin-left: 0.5rem; }
        form { display: flex; gap: 0.5rem; max-width: 800px; }
        input { flex: 1; padding: 0.5rem; background: #111; color: #fff; border: 1px solid #333; border-radius: 6px; }
        button { padding: 0.5rem 1rem; background: #00ff88; border: none; border-radius: 6px; }
    </style>
</head>
<body>
    <h1>Cody</h1>
    <div id="log"></div>
    <form id="chat-form">
        <input id="message" autocomplete="off" placeholder="Ask something...">
        <button type="submit">Send</button>
    </form>

    <script>
        const log = document.getElementById('log');

        function append(who, text, badge) {
            const row = document.createElement('div');
            row.className = 'msg';
            row.innerHTML = `<span class="who">${who}</span>`;
            row.appendChild(document.createTextNode(text));
            if (badge) {
                const tag = document.createElement('span');
                tag.className = 'badge';
                tag.textContent = badge;
                row.appendChild(tag);
            }
            log.appendChild(row);
        }

        document.getElementById('chat-form').addEventListener('submit', async (event) => {
            event.preventDefault();
            const input = document.getElementById('message');
            const message = input.value.trim();
            if (!message) return;
            input.value = '';
            append('you', message);
            try {
                const res = await fetch('/chat', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({ message }),
                });
                const data = await res.json();
                append('cody', data.reply ?? data.error, data.provider);
            } catch (err) {
                append('error', String(err));
            }
        });
    </script>
</body>
</html>
"#;
