//! The seam between the router and the model backends

use async_trait::async_trait;

/// One generate call as the router issues it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    /// Model identifier (e.g., "qwen3-coder:480b-cloud")
    pub model: String,
    /// Composed prompt, including any replayed outage queue
    pub prompt: String,
    /// Fixed system instruction for the model
    pub system: Option<String>,
    /// Trace ID for request correlation
    pub trace_id: Option<String>,
}

impl ModelRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system: None,
            trace_id: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

/// A backend that may or may not answer a chat message
///
/// Implementations never fail: "not configured", "unreachable", "timed out"
/// and "malformed answer" all come back as `None`.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, request: &ModelRequest) -> Option<String>;
}
