//! LLM invocation boundary.
//!
//! Analyzers only see the [`LlmGateway`] capability: a prompt goes in, raw
//! text comes out, or the call fails. Retry policy, if any, belongs to the
//! gateway implementation.

pub mod ollama;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use ollama::{OllamaConfig, OllamaGateway};

/// Generation options passed with every prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    /// Upper bound on generated tokens.
    pub max_output_tokens: u32,
    /// Generation stops at the first of these sequences.
    pub stop_sequences: Vec<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_output_tokens: 300,
            stop_sequences: vec!["</s>".to_string()],
        }
    }
}

/// Failure to obtain output from the model.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("cannot connect to model backend at {0}")]
    Connect(String),

    #[error("model backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response from model backend: {0}")]
    Decode(String),

    #[error("model produced no output")]
    EmptyOutput,

    #[error("request failed: {0}")]
    Request(String),
}

/// Text-generation capability consumed by every analyzer.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str, options: &GenerateOptions)
        -> Result<String, GatewayError>;
}
