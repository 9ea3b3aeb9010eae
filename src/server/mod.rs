//! Front ends: line-delimited JSON over TCP, and HTTP
//!
//! Both front ends forward chat messages unchanged to a `ChatRouter`. Which
//! router they get is decided by `RouterSource`:
//!
//! - `Shared` - one router for the process; a provider outage seen by one
//!   client is replayed when any client's request gets through
//! - `PerConnection` - a fresh router per TCP connection / HTTP request;
//!   outage queues are private and die with the connection

pub mod http;
pub mod tcp;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{RouterScope, Settings};
use crate::router::ChatRouter;
use crate::sandbox::{CodeRunner, DockerExecutor, SandboxPolicy};

pub type RouterFactory = Arc<dyn Fn() -> ChatRouter + Send + Sync>;

/// Where a connection gets its router from
#[derive(Clone)]
pub enum RouterSource {
    Shared(Arc<ChatRouter>),
    PerConnection(RouterFactory),
}

impl RouterSource {
    pub fn shared(router: ChatRouter) -> Self {
        RouterSource::Shared(Arc::new(router))
    }

    pub fn per_connection(factory: impl Fn() -> ChatRouter + Send + Sync + 'static) -> Self {
        RouterSource::PerConnection(Arc::new(factory))
    }

    pub fn from_settings(settings: &Settings) -> Self {
        match settings.router_scope {
            RouterScope::Shared => Self::shared(ChatRouter::from_settings(settings)),
            RouterScope::PerConnection => {
                let settings = settings.clone();
                Self::per_connection(move || ChatRouter::from_settings(&settings))
            }
        }
    }

    /// Router for a new connection or request
    pub fn resolve(&self) -> Arc<ChatRouter> {
        match self {
            RouterSource::Shared(router) => Arc::clone(router),
            RouterSource::PerConnection(factory) => Arc::new(factory()),
        }
    }
}

/// Everything a front end needs to answer requests
#[derive(Clone)]
pub struct ServiceContext {
    pub routers: RouterSource,
    /// Runner for the explicit `run` command
    pub runner: Arc<dyn CodeRunner>,
    pub sandbox_policy: SandboxPolicy,
    pub changelog: PathBuf,
}

impl ServiceContext {
    pub fn new(routers: RouterSource, runner: Arc<dyn CodeRunner>, sandbox_policy: SandboxPolicy) -> Self {
        Self {
            routers,
            runner,
            sandbox_policy,
            changelog: PathBuf::from(crate::config::DEFAULT_CHANGELOG),
        }
    }

    pub fn with_changelog(mut self, changelog: impl Into<PathBuf>) -> Self {
        self.changelog = changelog.into();
        self
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            RouterSource::from_settings(settings),
            Arc::new(DockerExecutor::new()),
            settings.sandbox_policy(),
        )
        .with_changelog(settings.changelog.clone())
    }
}

/// Malformed or unsupported request, reported to the client as `{ok:false, error}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Line is not valid UTF-8
    InvalidEncoding,
    InvalidJson,
    /// Valid JSON, but not an object
    InvalidMessageType,
    /// Required field missing or of the wrong type
    InvalidPayload,
    UnknownCommand,
    UnsupportedLanguage,
    /// Line exceeded the protocol's length cap
    LineTooLong,
}

impl ProtocolError {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolError::InvalidEncoding => "invalid_encoding",
            ProtocolError::InvalidJson => "invalid_json",
            ProtocolError::InvalidMessageType => "invalid_message_type",
            ProtocolError::InvalidPayload => "invalid_payload",
            ProtocolError::UnknownCommand => "unknown_command",
            ProtocolError::UnsupportedLanguage => "unsupported_language",
            ProtocolError::LineTooLong => "line_too_long",
        }
    }

    /// Error envelope sent back to the client; counts the rejection
    pub fn to_response(self) -> serde_json::Value {
        crate::metrics::PROTOCOL_ERRORS_TOTAL
            .with_label_values(&[self.as_str()])
            .inc();
        serde_json::json!({ "ok": false, "error": self.as_str() })
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_envelope() {
        let response = ProtocolError::UnknownCommand.to_response();
        assert_eq!(response["ok"], false);
        assert_eq!(response["error"], "unknown_command");
        assert_eq!(ProtocolError::InvalidEncoding.to_string(), "invalid_encoding");
    }

    #[test]
    fn test_shared_source_reuses_router() {
        let source = RouterSource::shared(ChatRouter::from_settings(&Settings::default()));
        assert!(Arc::ptr_eq(&source.resolve(), &source.resolve()));
    }

    #[test]
    fn test_per_connection_source_builds_fresh_routers() {
        let settings = Settings {
            router_scope: RouterScope::PerConnection,
            ..Settings::default()
        };
        let source = RouterSource::from_settings(&settings);
        assert!(!Arc::ptr_eq(&source.resolve(), &source.resolve()));
    }
}
