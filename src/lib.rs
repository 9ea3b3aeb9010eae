//! Cody - agent-serving backend with provider fallback and sandboxed execution
//!
//! This library routes chat requests either to a locally executed, sandboxed
//! snippet (for directly computable requests) or to a chain of Ollama-served
//! models, queueing messages while every provider is unreachable.
//!
//! # Modules
//!
//! - `router` - intent classification, provider fallback chain, outage queue
//! - `sandbox` - Docker-based execution of untrusted code under a fixed policy
//! - `ollama` - Ollama client for the model providers
//! - `server` - line-protocol TCP and HTTP front ends
//! - `status` - phase status introspection
//! - `config` - runtime settings (CLI flags / environment)
//! - `metrics` - Prometheus metrics for observability
//! - `tracing` - structured logging and OpenTelemetry export
//!
//! # Quick Start
//!
//! ```ignore
//! use cody::{ChatRequest, ChatRouter, Settings};
//!
//! let router = ChatRouter::from_settings(&Settings::default());
//! let result = router.route_chat(ChatRequest::new("What is 2 + 2 * 10?")).await;
//! assert_eq!(result.reply, "22");
//! ```

pub mod config;
pub mod metrics;
pub mod ollama;
pub mod router;
pub mod sandbox;
pub mod server;
pub mod status;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use config::{RouterScope, Settings};
pub use ollama::OllamaClient;
pub use router::{ChatProvider, ChatRequest, ChatResult, ChatRouter, Provider, RouterConfig};
pub use sandbox::{CodeRunner, DockerExecutor, SandboxPolicy, SandboxResult};
