//! Embedding and generation traits plus vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement and
//! the [`HypotheticalGenerator`] used by the HyDE retrieval stage, plus pure
//! helper functions for vector serialization and similarity computation.
//!
//! Concrete providers (OpenAI-compatible HTTP, disabled) live in the
//! `concierge-harness` app crate.

use anyhow::Result;
use async_trait::async_trait;

/// Turns text into fixed-length dense vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"openai/text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts. The result has one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            anyhow::bail!("expected 1 embedding, provider returned {}", vectors.len());
        }
        Ok(vectors.remove(0))
    }
}

/// Produces a short hypothetical answer to a question (HyDE).
///
/// The hypothetical text lives closer to indexed answers in embedding space
/// than a colloquial question does.
#[async_trait]
pub trait HypotheticalGenerator: Send + Sync {
    /// Returns the hypothetical answer. An empty string means "no answer".
    async fn generate_hypothetical(&self, query: &str) -> Result<String>;
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use concierge_harness_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, zero vectors, or vectors of different lengths.
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

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
