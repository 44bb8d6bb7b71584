//! Embedding provider implementations.
//!
//! Implements the core [`Embedder`] trait for:
//! - **[`DisabledEmbedder`]**: always errors; used when embeddings are not configured.
//! - **[`OpenAICompatEmbedder`]**: any OpenAI-compatible `POST {base_url}/embeddings`
//!   endpoint (OpenRouter by default) with batching, retry, and backoff.
//!
//! # Provider Selection
//!
//! Use [`create_embedder`] to instantiate the appropriate provider based
//! on the configuration:
//!
//! ```rust,no_run
//! # use concierge_harness::config::EmbeddingConfig;
//! # use concierge_harness::embedding::create_embedder;
//! # use concierge_harness_core::embedding::Embedder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use concierge_harness_core::content::{truncate_chars, MAX_EMBED_CHARS};
use concierge_harness_core::embedding::Embedder;

use crate::config::EmbeddingConfig;
use crate::http;

// ============ Disabled Provider ============

/// An embedder that always returns errors.
///
/// Used when `embedding.provider = "disabled"`. Ingestion and retrieval
/// calls fail with a descriptive message; edit paths keep their rows.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI-compatible Provider ============

/// Embedding provider for OpenAI-compatible APIs.
///
/// Splits input into `batch_size` sub-batches, pausing `batch_delay_ms`
/// between them, and truncates every text to 8000 characters.
pub struct OpenAICompatEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: usize,
    batch_size: usize,
    batch_delay: Duration,
    max_retries: u32,
}

impl OpenAICompatEmbedder {
    /// # Errors
    ///
    /// Returns an error if the API key environment variable is not set.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = http::api_key_from_env(&config.api_key_env)?;
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size.max(1),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            max_retries: config.max_retries,
        })
    }

    async fn embed_one_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let input: Vec<String> = texts
            .iter()
            .map(|t| truncate_chars(t, MAX_EMBED_CHARS))
            .collect();
        let body = serde_json::json!({
            "model": self.model,
            "input": input,
        });
        let auth = format!("Bearer {}", self.api_key);
        let json = http::post_json(
            &self.client,
            "Embeddings",
            &self.url,
            &[("Authorization", auth.as_str())],
            &body,
            self.max_retries,
        )
        .await?;

        let vectors = parse_embeddings_response(&json)?;
        if vectors.len() != texts.len() {
            bail!(
                "Embeddings API returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            );
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for OpenAICompatEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        let batches: Vec<&[String]> = texts.chunks(self.batch_size).collect();
        let total = batches.len();

        for (i, batch) in batches.into_iter().enumerate() {
            results.extend(self.embed_one_batch(batch).await?);
            if i + 1 < total && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        Ok(results)
    }
}

/// Parse an OpenAI-style embeddings response.
///
/// Extracts `data[].embedding`, ordered by `data[].index` when present.
pub fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());

    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Create the configured [`Embedder`].
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAICompatEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAICompatEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
