//! Ollama API client for the model providers
//!
//! One blocking (non-streaming) `/api/generate` call per chat attempt. Every
//! failure mode (endpoint not configured, connection refused, timeout, bad
//! status, malformed body) surfaces as a `ModelError` from `generate`, and as
//! `None` through the `ChatProvider` seam the router uses.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::metrics::{MODEL_CALL_DURATION, MODEL_TOKENS_TOTAL};
use crate::router::{ChatProvider, ModelRequest};

/// Default per-call timeout, sized for large (cloud) models
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(60);

/// Response from Ollama's generate endpoint with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateResponse {
    /// The generated text
    pub response: String,
    /// Number of tokens generated
    pub eval_count: u32,
    /// Number of tokens in the prompt
    pub prompt_eval_count: u32,
    /// Time spent generating tokens (nanoseconds)
    pub eval_duration_ns: u64,
}

/// Request body for `/api/generate`
#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

/// The subset of the generate response we read
#[derive(Debug, Deserialize)]
struct RawGenerateResponse {
    response: String,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_duration: u64,
}

/// Error type for model calls
#[derive(Debug)]
pub enum ModelError {
    /// No base URL configured for this provider
    NotConfigured,
    /// Connection failure or timeout
    Transport(reqwest::Error),
    /// Server answered with a non-success status
    Status(u16),
    /// Body was not a generate response
    Decode(String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::NotConfigured => write!(f, "Model endpoint not configured"),
            ModelError::Transport(e) if e.is_timeout() => write!(f, "Model call timed out: {}", e),
            ModelError::Transport(e) => write!(f, "Model transport error: {}", e),
            ModelError::Status(code) => write!(f, "Model endpoint returned status {}", code),
            ModelError::Decode(msg) => write!(f, "Malformed model response: {}", msg),
        }
    }
}

impl std::error::Error for ModelError {}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ModelError::Decode(e.to_string())
        } else {
            ModelError::Transport(e)
        }
    }
}

/// Client for interacting with Ollama's HTTP API
#[derive(Clone)]
pub struct OllamaClient {
    base_url: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new Ollama client
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the Ollama server (e.g., "http://localhost:11434"),
    ///   or `None` for a provider that is absent
    /// * `timeout` - Upper bound for one generate call
    pub fn new(base_url: Option<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    /// A client with no endpoint; every call returns "no reply" immediately
    pub fn unconfigured() -> Self {
        Self::new(None, DEFAULT_MODEL_TIMEOUT)
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Generate a complete (non-streaming) response from Ollama
    ///
    /// # Returns
    /// GenerateResponse with the text and token/timing metadata
    pub async fn generate(&self, request: &ModelRequest) -> Result<GenerateResponse, ModelError> {
        let base_url = self.base_url.as_deref().ok_or(ModelError::NotConfigured)?;
        let endpoint = format!("{}/api/generate", base_url);

        let mut http = self
            .client
            .post(&endpoint)
            .timeout(self.timeout)
            .json(&GenerateBody {
                model: &request.model,
                prompt: &request.prompt,
                stream: false,
                system: request.system.as_deref(),
            });

        if let Some(tid) = &request.trace_id {
            http = http.header("X-Trace-Id", tid);
        }

        let response = http.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ModelError::Status(status.as_u16()));
        }

        let raw: RawGenerateResponse = response.json().await?;

        Ok(GenerateResponse {
            response: raw.response,
            eval_count: raw.eval_count,
            prompt_eval_count: raw.prompt_eval_count,
            eval_duration_ns: raw.eval_duration,
        })
    }
}

#[async_trait]
impl ChatProvider for OllamaClient {
    async fn chat(&self, request: &ModelRequest) -> Option<String> {
        if !self.is_configured() {
            debug!(model = %request.model, "Provider not configured, skipping");
            return None;
        }

        let start = Instant::now();
        let result = self.generate(request).await;
        MODEL_CALL_DURATION
            .with_label_values(&[&request.model])
            .observe(start.elapsed().as_secs_f64());

        match result {
            Ok(generated) if !generated.response.trim().is_empty() => {
                record_usage(&request.model, &generated);
                Some(generated.response)
            }
            Ok(_) => {
                warn!(model = %request.model, "Model returned an empty response");
                None
            }
            Err(e) => {
                warn!(model = %request.model, error = %e, "Model call failed");
                None
            }
        }
    }
}

/// Token counts into metrics, timing into the debug log
fn record_usage(model: &str, generated: &GenerateResponse) {
    MODEL_TOKENS_TOTAL
        .with_label_values(&[model, "prompt"])
        .inc_by(generated.prompt_eval_count as f64);
    MODEL_TOKENS_TOTAL
        .with_label_values(&[model, "generated"])
        .inc_by(generated.eval_count as f64);

    let tokens_per_sec = if generated.eval_duration_ns > 0 {
        generated.eval_count as f64 / (generated.eval_duration_ns as f64 / 1e9)
    } else {
        0.0
    };
    debug!(
        model = %model,
        prompt_tokens = generated.prompt_eval_count,
        generated_tokens = generated.eval_count,
        eval_duration_ms = generated.eval_duration_ns as f64 / 1e6,
        tokens_per_sec,
        "Model replied"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = OllamaClient::new(Some("http://localhost:11434/".into()), DEFAULT_MODEL_TIMEOUT);
        assert_eq!(client.base_url(), Some("http://localhost:11434"));
    }

    #[test]
    fn test_empty_url_is_unconfigured() {
        let client = OllamaClient::new(Some(String::new()), DEFAULT_MODEL_TIMEOUT);
        assert!(!client.is_configured());
    }

    #[test]
    fn test_body_serialization() {
        let body = GenerateBody {
            model: "qwen3",
            prompt: "hi",
            stream: false,
            system: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"model": "qwen3", "prompt": "hi", "stream": false}));
    }

    #[tokio::test]
    async fn test_unconfigured_returns_none() {
        let client = OllamaClient::unconfigured();
        let request = ModelRequest::new("qwen3", "hello");
        assert!(client.chat(&request).await.is_none());
        assert!(matches!(client.generate(&request).await, Err(ModelError::NotConfigured)));
    }
}
