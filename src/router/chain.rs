//! Chat router - classifier, direct execution and the provider fallback chain
//!
//! Per request:
//!
//! ```text
//!            CLASSIFY
//!           /        \
//!   DIRECT_EXEC    PRIMARY_ATTEMPT ──reply──► clear queue, answer (primary)
//!   (sandbox)          │ none
//!                  FALLBACK_ATTEMPT ─reply──► clear queue, answer (fallback)
//!                      │ none
//!                    QUEUE ─────────────────► stub reply, queued = true
//! ```
//!
//! Providers are tried strictly in order, never raced. Directly computable
//! requests never reach a model.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use prometheus::Gauge;
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::classifier::{classify, Intent};
use super::provider::{ChatProvider, ModelRequest};
use super::queue::PendingQueue;
use crate::config::{Settings, DEFAULT_FALLBACK_MODEL, DEFAULT_PRIMARY_MODEL};
use crate::metrics::{CHAT_REQUESTS_TOTAL, PENDING_QUEUE_DEPTH, PROVIDER_ATTEMPTS_TOTAL};
use crate::ollama::OllamaClient;
use crate::sandbox::{CodeRunner, DockerExecutor, SandboxPolicy, SandboxResult};
use crate::trace_log;

/// Recipient tag used when the caller does not supply one
pub const UNKNOWN_RECIPIENT: &str = "unknown";

/// An inbound chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    /// Trace ID threaded through every log line for this request
    pub request_id: String,
    /// Opaque origin tag (e.g., peer address), only used in logs
    pub recipient: String,
}

impl ChatRequest {
    /// Create a request with a fresh time-sortable trace ID
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            request_id: Uuid::now_v7().to_string(),
            recipient: UNKNOWN_RECIPIENT.to_string(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = recipient.into();
        self
    }
}

/// Which path produced a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Primary,
    Fallback,
    LocalTool,
    LocalToolError,
    Stub,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Primary => "primary",
            Provider::Fallback => "fallback",
            Provider::LocalTool => "local_tool",
            Provider::LocalToolError => "local_tool_error",
            Provider::Stub => "stub",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of routing one chat request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatResult {
    pub trace_id: String,
    pub reply: String,
    pub provider: Provider,
    /// True only for the stub provider
    pub queued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ChatResult {
    fn answered(trace_id: &str, reply: String, provider: Provider) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            reply,
            provider,
            queued: false,
            queued_count: None,
            executed_code: None,
            exit_code: None,
        }
    }
}

/// Model identifiers and sandbox policy for a router
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub primary_model: String,
    pub fallback_model: String,
    /// Policy for direct-execution requests
    pub sandbox_policy: SandboxPolicy,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            primary_model: DEFAULT_PRIMARY_MODEL.to_string(),
            fallback_model: DEFAULT_FALLBACK_MODEL.to_string(),
            sandbox_policy: SandboxPolicy::default(),
        }
    }
}

impl From<&Settings> for RouterConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            primary_model: settings.primary_model.clone(),
            fallback_model: settings.fallback_model.clone(),
            sandbox_policy: settings.sandbox_policy(),
        }
    }
}

/// Build the prompt sent to a model, replaying queued messages oldest-first
pub fn compose_prompt(queued: &[String], message: &str) -> String {
    if queued.is_empty() {
        return message.to_string();
    }

    let mut prompt = String::from(
        "System note: the model was unreachable while earlier messages arrived. \
         Answer them together with the latest one.\nQueued messages:\n",
    );
    for item in queued {
        prompt.push_str("- ");
        prompt.push_str(item);
        prompt.push('\n');
    }
    prompt.push_str("\nLatest user message:\n");
    prompt.push_str(message);
    prompt
}

/// Stub acknowledgement returned while every provider is down
pub fn stub_reply(message: &str) -> String {
    format!("[stub] Cody received: {}", message)
}

/// Routes chat requests; owns its outage queue
pub struct ChatRouter {
    primary: Arc<dyn ChatProvider>,
    fallback: Arc<dyn ChatProvider>,
    runner: Arc<dyn CodeRunner>,
    config: RouterConfig,
    pending: Mutex<PendingQueue>,
    /// Total pending across live routers; this router adds and removes its own share
    queue_gauge: Gauge,
}

impl ChatRouter {
    /// Create a router
    ///
    /// # Arguments
    /// * `primary` - Provider tried first
    /// * `fallback` - Provider tried when the primary has no reply
    /// * `runner` - Executes directly computable requests
    /// * `config` - Model identifiers and sandbox policy
    pub fn new(
        primary: Arc<dyn ChatProvider>,
        fallback: Arc<dyn ChatProvider>,
        runner: Arc<dyn CodeRunner>,
        config: RouterConfig,
    ) -> Self {
        Self {
            primary,
            fallback,
            runner,
            config,
            pending: Mutex::new(PendingQueue::new()),
            queue_gauge: PENDING_QUEUE_DEPTH.clone(),
        }
    }

    /// Report queue depth to `gauge` instead of the global metric
    pub fn with_queue_gauge(mut self, gauge: Gauge) -> Self {
        let queued = self.pending_len() as f64;
        self.queue_gauge.sub(queued);
        gauge.add(queued);
        self.queue_gauge = gauge;
        self
    }

    /// Router backed by Ollama providers and the Docker executor
    pub fn from_settings(settings: &Settings) -> Self {
        let timeout = settings.model_timeout();
        Self::new(
            Arc::new(OllamaClient::new(settings.primary_url.clone(), timeout)),
            Arc::new(OllamaClient::new(settings.fallback_url.clone(), timeout)),
            Arc::new(DockerExecutor::new()),
            RouterConfig::from(settings),
        )
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Queued messages, oldest first
    pub fn pending_messages(&self) -> Vec<String> {
        self.lock_pending().messages()
    }

    pub fn pending_len(&self) -> usize {
        self.lock_pending().len()
    }

    /// Route one chat request. Never fails; degradation shows in `provider`.
    pub async fn route_chat(&self, request: ChatRequest) -> ChatResult {
        let span = info_span!(
            "route_chat",
            trace_id = %request.request_id,
            recipient = %request.recipient,
            otel.name = "route_chat"
        );

        async {
            trace_log!(
                info,
                request.request_id,
                recipient = %request.recipient,
                queue_depth = self.pending_len(),
                "Chat request received"
            );

            let result = match classify(&request.message) {
                Intent::DirectExec { code } => self.execute_directly(&request, code).await,
                Intent::Model { instruction } => self.route_to_models(&request, instruction).await,
            };

            CHAT_REQUESTS_TOTAL
                .with_label_values(&[result.provider.as_str()])
                .inc();
            trace_log!(
                info,
                request.request_id,
                provider = %result.provider,
                queued = result.queued,
                "Response sent"
            );
            result
        }
        .instrument(span)
        .await
    }

    async fn execute_directly(&self, request: &ChatRequest, code: String) -> ChatResult {
        let trace_id = &request.request_id;
        trace_log!(info, trace_id, code = %code, "Direct execution");

        let outcome = self.runner.run(&code, &self.config.sandbox_policy).await;

        let (reply, provider, exit_code) = match outcome {
            SandboxResult::Completed(out) if out.exit_code == 0 => {
                (out.stdout.trim().to_string(), Provider::LocalTool, Some(0))
            }
            SandboxResult::Completed(out) => {
                let stderr = out.stderr.trim();
                let reply = if stderr.is_empty() {
                    format!("exited with code {}", out.exit_code)
                } else {
                    stderr.to_string()
                };
                (reply, Provider::LocalToolError, Some(out.exit_code))
            }
            SandboxResult::Failed { error, message } => {
                warn!(trace_id = %trace_id, ?error, "Direct execution failed");
                (message, Provider::LocalToolError, None)
            }
        };

        ChatResult {
            executed_code: Some(code),
            exit_code,
            ..ChatResult::answered(trace_id, reply, provider)
        }
    }

    async fn route_to_models(&self, request: &ChatRequest, instruction: &str) -> ChatResult {
        let trace_id = &request.request_id;
        let snapshot = self.lock_pending().snapshot();
        let prompt = compose_prompt(&snapshot.messages, &request.message);

        let attempts = [
            (Provider::Primary, &self.primary, &self.config.primary_model),
            (Provider::Fallback, &self.fallback, &self.config.fallback_model),
        ];

        for (provider, client, model) in attempts {
            let model_request = ModelRequest::new(model.as_str(), prompt.as_str())
                .with_system(instruction)
                .with_trace_id(trace_id.as_str());

            if let Some(reply) = self.attempt(provider, client.as_ref(), &model_request).await {
                let cleared = {
                    let mut pending = self.lock_pending();
                    let cleared = pending.clear_through(snapshot.upto);
                    self.queue_gauge.sub(cleared as f64);
                    cleared
                };
                if cleared > 0 {
                    trace_log!(info, trace_id, cleared, "Replayed outage queue and cleared it");
                }
                return ChatResult::answered(trace_id, reply, provider);
            }
        }

        let queued_count = {
            let mut pending = self.lock_pending();
            let len = pending.push(request.message.clone());
            self.queue_gauge.inc();
            len
        };
        trace_log!(warn, trace_id, queued_count, "Message queued, all providers unavailable");

        ChatResult {
            queued: true,
            queued_count: Some(queued_count),
            ..ChatResult::answered(trace_id, stub_reply(&request.message), Provider::Stub)
        }
    }

    async fn attempt(
        &self,
        provider: Provider,
        client: &dyn ChatProvider,
        request: &ModelRequest,
    ) -> Option<String> {
        let trace_id = request.trace_id.as_deref().unwrap_or_default();
        trace_log!(info, trace_id, %provider, model = %request.model, "Provider attempt started");

        let start = Instant::now();
        let reply = client.chat(request).await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        match &reply {
            Some(_) => {
                PROVIDER_ATTEMPTS_TOTAL
                    .with_label_values(&[provider.as_str(), "replied"])
                    .inc();
                trace_log!(info, trace_id, %provider, model = %request.model, duration_ms, "Provider responded");
            }
            None => {
                PROVIDER_ATTEMPTS_TOTAL
                    .with_label_values(&[provider.as_str(), "unavailable"])
                    .inc();
                trace_log!(warn, trace_id, %provider, model = %request.model, duration_ms, "Provider unavailable");
            }
        }
        reply
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingQueue> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ChatRouter {
    fn drop(&mut self) {
        let abandoned = self.lock_pending().len();
        if abandoned > 0 {
            self.queue_gauge.sub(abandoned as f64);
            warn!(abandoned, "Router dropped with messages still queued");
        }
    }
}
