//! Ollama text-generation backend.
//!
//! Sends one non-streaming `/api/generate` request per prompt. Prompts are
//! sent raw since the analyzers embed their own instruction tags.

use super::{GatewayError, GenerateOptions, LlmGateway};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Connection settings for the Ollama backend.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub ollama_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "mistral:7b-instruct".to_string(),
            temperature: 0.1,
            timeout_seconds: 600,
        }
    }
}

/// Ollama generate API request.
#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    raw: bool,
    options: OllamaOptions<'a>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions<'a> {
    temperature: f32,
    num_predict: u32,
    stop: &'a [String],
}

/// Ollama generate API response.
#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

/// Gateway backed by a running Ollama server.
pub struct OllamaGateway {
    config: OllamaConfig,
    http_client: reqwest::Client,
}

impl OllamaGateway {
    /// Create a gateway for the configured server and model.
    pub fn new(config: OllamaConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| GatewayError::Request(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

#[async_trait]
impl LlmGateway for OllamaGateway {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, GatewayError> {
        let url = format!("{}/api/generate", self.config.ollama_url.trim_end_matches('/'));

        let request = OllamaGenerateRequest {
            model: &self.config.model_name,
            prompt,
            stream: false,
            raw: true,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: options.max_output_tokens,
                stop: &options.stop_sequences,
            },
        };

        debug!(
            "Sending generate request ({} prompt chars) to {}",
            prompt.chars().count(),
            self.config.model_name
        );

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(Duration::from_secs(self.config.timeout_seconds))
                } else if e.is_connect() {
                    GatewayError::Connect(self.config.ollama_url.clone())
                } else {
                    GatewayError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status, body });
        }

        let generated: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        generated.response.ok_or(GatewayError::EmptyOutput)
    }
}
