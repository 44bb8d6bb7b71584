//! Vector index abstraction.
//!
//! The vector index is a derived, disposable projection of the knowledge
//! store: every [`VectorRecord`] shares its id with a
//! [`KnowledgeEntry`](crate::models::KnowledgeEntry) and must never outlive it.
//! Backends: [`memory::InMemoryVectorIndex`] here, SQLite and Pinecone in
//! the app crate.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{RetrievalHit, VectorMetadata, VectorRecord};

/// Metadata filter applied before ranking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    pub category_id: Option<String>,
    pub source: Option<String>,
    /// Only match vectors whose metadata says `active = true`.
    pub active_only: bool,
}

impl QueryFilter {
    /// Active entries, optionally restricted to one category.
    pub fn active_in(category_id: Option<&str>) -> Self {
        Self {
            category_id: category_id.map(str::to_string),
            source: None,
            active_only: true,
        }
    }

    pub fn matches(&self, metadata: &VectorMetadata) -> bool {
        if self.active_only && !metadata.active {
            return false;
        }
        if let Some(ref c) = self.category_id {
            if metadata.category_id.as_deref() != Some(c.as_str()) {
                return false;
            }
        }
        if let Some(ref s) = self.source {
            if &metadata.source != s {
                return false;
            }
        }
        true
    }
}

/// Approximate-nearest-neighbour store keyed by entry id.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite one vector.
    async fn upsert(&self, record: VectorRecord) -> Result<()>;

    /// Insert or overwrite many vectors. Backends may split into requests.
    async fn upsert_batch(&self, records: Vec<VectorRecord>) -> Result<()>;

    async fn delete_by_ids(&self, ids: &[String]) -> Result<()>;

    /// Delete every vector whose metadata `source` equals `source`.
    async fn delete_by_source(&self, source: &str) -> Result<()>;

    /// Top-`top_k` cosine matches passing `filter`, then dropping anything
    /// scoring below `score_floor`. Sorted by score descending.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &QueryFilter,
        score_floor: f32,
    ) -> Result<Vec<RetrievalHit>>;
}

/// Sort hits by score descending, keep the first `top_k`, drop those under `floor`.
pub fn rank_hits(mut hits: Vec<RetrievalHit>, top_k: usize, floor: f32) -> Vec<RetrievalHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(top_k);
    hits.retain(|h| h.score >= floor);
    hits
}
