//! Client for the external model service (Ollama HTTP API).
//!
//! The [`ModelService`] trait is the seam between the pipelines and the
//! network: it lists the models a service hosts, embeds text, and generates
//! completions. [`OllamaClient`] implements it against:
//!
//! | Endpoint | Purpose |
//! |----------|---------|
//! | `GET /api/tags` | list available models |
//! | `POST /api/embed` | batch embeddings |
//! | `POST /api/generate` | non-streaming completion |
//!
//! # Retry Strategy
//!
//! Embedding and generation calls use exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! The model-list call is a connectivity check and is never retried; it
//! uses the short `check_timeout_secs` timeout instead.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{ModelConfig, ServiceConfig};

/// Operations the pipelines need from a model-hosting service.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Base URL used in diagnostics.
    fn base_url(&self) -> &str;

    /// Names of all models the service can run.
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Embed each text with `model`, returning vectors in input order.
    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generate a completion for `prompt` with `model`.
    async fn generate(&self, model: &str, prompt: &str) -> Result<String>;
}

/// [`ModelService`] backed by an Ollama server.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
    check_timeout: Duration,
    max_retries: u32,
}

impl OllamaClient {
    pub fn new(base_url: &str, service: &ServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(service.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            check_timeout: Duration::from_secs(service.check_timeout_secs),
            max_retries: service.max_retries,
        })
    }

    pub fn from_config(models: &ModelConfig, service: &ServiceConfig) -> Result<Self> {
        Self::new(models.service_base_url(), service)
    }

    /// POST `body` to `path`, retrying transient failures.
    async fn post_with_retry(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(%url, attempt, ?delay, "retrying model service request");
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(&url).json(body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .with_context(|| format!("Invalid JSON from {}", url))?;
                        return Ok(json);
                    }

                    let body_text = response.text().await.unwrap_or_default();

                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(%url, %status, "model service returned a retryable error");
                        last_err = Some(anyhow::anyhow!(
                            "Model service error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("Model service error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(
                        "Connection error (is the model service running at {}?): {}",
                        self.base_url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Request to {} failed after retries", url)))
    }
}

#[async_trait]
impl ModelService for OllamaClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.check_timeout)
            .send()
            .await
            .with_context(|| format!("Failed to connect to {}", self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Model list request failed with status {}", status);
        }

        let json: serde_json::Value = response.json().await?;
        parse_tags_response(&json)
    }

    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": model,
            "input": texts,
        });
        let json = self.post_with_retry("/api/embed", &body).await?;
        let embeddings = parse_embed_response(&json)?;

        if embeddings.len() != texts.len() {
            bail!(
                "Embedding count mismatch: sent {} texts, received {} vectors",
                texts.len(),
                embeddings.len()
            );
        }
        Ok(embeddings)
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
        });
        let json = self.post_with_retry("/api/generate", &body).await?;
        parse_generate_response(&json)
    }
}

fn parse_tags_response(json: &serde_json::Value) -> Result<Vec<String>> {
    let models = json
        .get("models")
        .and_then(|m| m.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid model list response: missing models array"))?;

    Ok(models
        .iter()
        .filter_map(|m| m.get("name").and_then(|n| n.as_str()))
        .map(str::to_string)
        .collect())
}

fn parse_embed_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embed response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid embed response: embedding is not an array"))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}

fn parse_generate_response(json: &serde_json::Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid generate response: missing response field"))
}
