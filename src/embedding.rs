//! Embedding backend abstraction and HTTP implementation.
//!
//! Defines the [`EmbeddingBackend`] trait and the [`HttpEmbedder`], which
//! calls the provider's batched embeddings endpoint, plus
//! [`cosine_similarity`] for ranking.
//!
//! # Retry Strategy
//!
//! The HTTP embedder retries transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) retry
//! - HTTP 4xx (client error, not 429) fails immediately
//! - Network errors retry
//!
//! The default retry budget is a single retry; see `provider.max_retries`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::text::truncate_chars;

const MAX_ERROR_BODY_CHARS: usize = 2000;

/// Backend that turns texts into fixed-length vectors.
///
/// The gateway consumes this trait everywhere it needs embeddings, so tests
/// can substitute counting or failing backends.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input, in input
    /// order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embedding backend calling the provider's `POST {base_url}/embeddings`
/// endpoint with bearer-token auth.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_retries: u32,
    timeout: Duration,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, provider: &ProviderConfig, api_key: String) -> Self {
        Self {
            client,
            endpoint: format!("{}/embeddings", provider.base_url.trim_end_matches('/')),
            api_key,
            model: provider.embed_model.clone(),
            max_retries: provider.max_retries,
            timeout: Duration::from_secs(provider.timeout_secs),
        }
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_embeddings(&json);
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "embeddings endpoint returned {}: {}",
                            status,
                            truncate_chars(&body_text, MAX_ERROR_BODY_CHARS)
                        ));
                        continue;
                    }

                    // Client error (not 429): don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!(
                        "embeddings endpoint returned {}: {}",
                        status,
                        truncate_chars(&body_text, MAX_ERROR_BODY_CHARS)
                    );
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("embedding request failed after retries")))
    }
}

/// Parse the embeddings endpoint response JSON.
///
/// Extracts the `data[].embedding` arrays in order. A missing `data` array
/// or a non-list `embedding` field is an error.
fn parse_embeddings(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths. The
/// denominator carries a small epsilon so a zero-norm vector scores 0
/// instead of dividing by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt() + 1e-9)
}
