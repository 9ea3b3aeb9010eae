//! Runtime settings for the Cody service
//!
//! Every setting can be given as a CLI flag or a `CODY_*` environment
//! variable. `Settings::default()` mirrors the CLI defaults so library users
//! and tests can build a router without going through the CLI.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::sandbox::SandboxPolicy;

pub const DEFAULT_TCP_ADDR: &str = "0.0.0.0:8888";
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_PRIMARY_MODEL: &str = "qwen3-coder:480b-cloud";
pub const DEFAULT_FALLBACK_MODEL: &str = "deepseek-coder:6.7b";
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SANDBOX_IMAGE: &str = "python:3.12-alpine";
pub const DEFAULT_SANDBOX_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_DOCKER_BIN: &str = "docker";
pub const DEFAULT_CHANGELOG: &str = "CHANGELOG.md";

/// How front ends share router state (and therefore the outage queue)
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RouterScope {
    /// One router for the whole process; outage memory spans all clients
    Shared,
    /// A fresh router per TCP connection / HTTP request
    PerConnection,
}

/// Service configuration
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Address for the line-delimited JSON protocol
    #[arg(long, env = "CODY_TCP_ADDR", default_value = DEFAULT_TCP_ADDR)]
    pub tcp_addr: String,

    /// Address for the HTTP front end
    #[arg(long, env = "CODY_HTTP_ADDR", default_value = DEFAULT_HTTP_ADDR)]
    pub http_addr: String,

    /// Base URL of the primary Ollama server (unset = provider absent)
    #[arg(long, env = "CODY_PRIMARY_URL")]
    pub primary_url: Option<String>,

    /// Base URL of the fallback Ollama server (unset = provider absent)
    #[arg(long, env = "CODY_FALLBACK_URL")]
    pub fallback_url: Option<String>,

    #[arg(long, env = "CODY_PRIMARY_MODEL", default_value = DEFAULT_PRIMARY_MODEL)]
    pub primary_model: String,

    #[arg(long, env = "CODY_FALLBACK_MODEL", default_value = DEFAULT_FALLBACK_MODEL)]
    pub fallback_model: String,

    /// Per-call timeout for model requests, in seconds
    #[arg(long, env = "CODY_MODEL_TIMEOUT_SECS", default_value_t = DEFAULT_MODEL_TIMEOUT_SECS)]
    pub model_timeout_secs: u64,

    /// Container image used for sandboxed execution
    #[arg(long, env = "CODY_SANDBOX_IMAGE", default_value = DEFAULT_SANDBOX_IMAGE)]
    pub sandbox_image: String,

    /// Wall-clock limit for one sandboxed execution, in seconds
    #[arg(long, env = "CODY_SANDBOX_TIMEOUT_SECS", default_value_t = DEFAULT_SANDBOX_TIMEOUT_SECS)]
    pub sandbox_timeout_secs: u64,

    /// Container runtime CLI
    #[arg(long, env = "CODY_DOCKER_BIN", default_value = DEFAULT_DOCKER_BIN)]
    pub docker_bin: String,

    /// Whether all clients share one router or each gets its own
    #[arg(long, env = "CODY_ROUTER_SCOPE", value_enum, default_value_t = RouterScope::Shared)]
    pub router_scope: RouterScope,

    /// CHANGELOG.md consulted by the status commands
    #[arg(long, env = "CODY_CHANGELOG", default_value = DEFAULT_CHANGELOG)]
    pub changelog: PathBuf,

    /// OTLP collector endpoint; tracing export is disabled when unset
    #[arg(long, env = "CODY_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Emit JSON-formatted log lines
    #[arg(long, env = "CODY_LOG_JSON")]
    pub log_json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tcp_addr: DEFAULT_TCP_ADDR.to_string(),
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            primary_url: None,
            fallback_url: None,
            primary_model: DEFAULT_PRIMARY_MODEL.to_string(),
            fallback_model: DEFAULT_FALLBACK_MODEL.to_string(),
            model_timeout_secs: DEFAULT_MODEL_TIMEOUT_SECS,
            sandbox_image: DEFAULT_SANDBOX_IMAGE.to_string(),
            sandbox_timeout_secs: DEFAULT_SANDBOX_TIMEOUT_SECS,
            docker_bin: DEFAULT_DOCKER_BIN.to_string(),
            router_scope: RouterScope::Shared,
            changelog: PathBuf::from(DEFAULT_CHANGELOG),
            otlp_endpoint: None,
            log_json: false,
        }
    }
}

impl Settings {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    /// Sandbox policy with the configured image, runtime and timeout;
    /// isolation flags always keep their hardened defaults.
    pub fn sandbox_policy(&self) -> SandboxPolicy {
        SandboxPolicy {
            runtime: self.docker_bin.clone(),
            image: self.sandbox_image.clone(),
            timeout: Duration::from_secs(self.sandbox_timeout_secs),
            ..SandboxPolicy::default()
        }
    }
}
