//! Inference backend client
//!
//! Talks to an OpenAI-compatible `/v1/completions` endpoint such as vLLM.

use async_trait::async_trait;
use drunkenbot_common::config::CompletionConfig;
use drunkenbot_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Sampling parameters for one completion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Something that turns a prompt into raw model output
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn generate(&self, prompt: &str, params: SamplingParams) -> Result<String>;

    /// Model identifier reported by the service
    fn model(&self) -> &str;
}

/// vLLM completion client
pub struct VllmClient {
    client: reqwest::Client,
    url: String,
    model: String,
    top_p: f32,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    text: String,
}

impl VllmClient {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            top_p: config.top_p,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CompletionBackend for VllmClient {
    async fn generate(&self, prompt: &str, params: SamplingParams) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            prompt,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: self.top_p,
            stream: false,
        };

        let start = Instant::now();
        let result = async {
            let response = self
                .client
                .post(&self.url)
                .json(&request)
                .send()
                .await?
                .error_for_status()?;
            let body: CompletionResponse = response.json().await?;
            body.choices
                .into_iter()
                .next()
                .map(|choice| choice.text)
                .ok_or_else(|| AppError::CompletionError {
                    message: "inference response contained no choices".to_string(),
                })
        }
        .await;

        drunkenbot_common::metrics::record_completion(start.elapsed().as_secs_f64(), result.is_ok());
        if let Ok(text) = &result {
            debug!(raw_len = text.len(), "Inference completed");
        }
        result
    }

    fn model(&self) -> &str {
        &self.model
    }
}
