//! Ollama LLM integration module
//!
//! This module provides the client the router uses for its primary and
//! fallback model providers.

pub mod client;

pub use client::{GenerateResponse, ModelError, OllamaClient, DEFAULT_MODEL_TIMEOUT};
