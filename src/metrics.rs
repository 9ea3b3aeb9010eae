//! Prometheus metrics for the chat router, model calls and the sandbox
//!
//! All metrics live in the default prometheus registry and are exported in
//! text format by the HTTP front end at `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_histogram_vec,
    CounterVec, Encoder, Gauge, Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Router Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Chat requests answered, by the provider that produced the reply.
    ///
    /// Labels:
    /// - provider: primary | fallback | local_tool | local_tool_error | stub
    pub static ref CHAT_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "cody_chat_requests_total",
        "Chat requests answered, by provider",
        &["provider"]
    ).expect("failed to register CHAT_REQUESTS_TOTAL metric");

    /// Model provider attempts and whether they produced a reply.
    ///
    /// Labels:
    /// - provider: primary | fallback
    /// - outcome: replied | unavailable
    pub static ref PROVIDER_ATTEMPTS_TOTAL: CounterVec = register_counter_vec!(
        "cody_provider_attempts_total",
        "Model provider attempts by outcome",
        &["provider", "outcome"]
    ).expect("failed to register PROVIDER_ATTEMPTS_TOTAL metric");

    /// Messages held in outage queues, summed over every live router.
    ///
    /// Under per-connection scope this is the total across open connections;
    /// a router's share is removed when it is dropped.
    pub static ref PENDING_QUEUE_DEPTH: Gauge = register_gauge!(
        "cody_pending_queue_depth",
        "Messages waiting in the outage queue"
    ).expect("failed to register PENDING_QUEUE_DEPTH metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Model Client Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Wall-clock duration of generate calls, successful or not.
    pub static ref MODEL_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "cody_model_call_duration_seconds",
        "Duration of model generate calls",
        &["model"],
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).expect("failed to register MODEL_CALL_DURATION metric");

    /// Tokens reported by successful generate calls.
    ///
    /// Labels:
    /// - model: Ollama model name
    /// - kind: prompt | generated
    pub static ref MODEL_TOKENS_TOTAL: CounterVec = register_counter_vec!(
        "cody_model_tokens_total",
        "Tokens reported by the model, by kind",
        &["model", "kind"]
    ).expect("failed to register MODEL_TOKENS_TOTAL metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Sandbox Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Sandbox executions by outcome.
    ///
    /// Labels:
    /// - outcome: completed | timeout | docker_unavailable | spawn_error | rejected
    pub static ref SANDBOX_EXECUTIONS: CounterVec = register_counter_vec!(
        "cody_sandbox_executions_total",
        "Sandbox executions by outcome",
        &["outcome"]
    ).expect("failed to register SANDBOX_EXECUTIONS metric");

    pub static ref SANDBOX_DURATION: Histogram = register_histogram!(
        "cody_sandbox_duration_seconds",
        "Wall-clock duration of sandbox executions",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0]
    ).expect("failed to register SANDBOX_DURATION metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Front End Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Malformed requests rejected by a front end.
    ///
    /// Labels:
    /// - error: invalid_encoding | invalid_json | invalid_message_type | ...
    pub static ref PROTOCOL_ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "cody_protocol_errors_total",
        "Malformed requests rejected by a front end",
        &["error"]
    ).expect("failed to register PROTOCOL_ERRORS_TOTAL metric");
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
