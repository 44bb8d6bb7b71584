//! In-memory [`VectorIndex`] with brute-force cosine search.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{RetrievalHit, VectorRecord};

use super::{rank_hits, QueryFilter, VectorIndex};

/// In-memory vector index for tests and embedded deployments.
pub struct InMemoryVectorIndex {
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records
            .read()
            .map(|r| r.contains_key(id))
            .unwrap_or(false)
    }

    /// Snapshot of one record, for assertions.
    pub fn get(&self, id: &str) -> Option<VectorRecord> {
        self.records.read().ok().and_then(|r| r.get(id).cloned())
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("vector index lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn upsert_batch(&self, batch: Vec<VectorRecord>) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        for record in batch {
            records.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        for id in ids {
            records.remove(id);
        }
        Ok(())
    }

    async fn delete_by_source(&self, source: &str) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        records.retain(|_, r| r.metadata.source != source);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &QueryFilter,
        score_floor: f32,
    ) -> Result<Vec<RetrievalHit>> {
        let records = self.records.read().map_err(poisoned)?;
        let hits = records
            .values()
            .filter(|r| filter.matches(&r.metadata))
            .map(|r| RetrievalHit::new(&r.id, cosine_similarity(vector, &r.vector)))
            .collect();
        Ok(rank_hits(hits, top_k, score_floor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VectorMetadata;

    fn record(id: &str, v: Vec<f32>, source: &str, active: bool) -> VectorRecord {
        VectorRecord {
            id: id.into(),
            vector: v,
            metadata: VectorMetadata {
                title: id.into(),
                section: None,
                category_id: None,
                source: source.into(),
                language: "es".into(),
                active,
            },
        }
    }

    #[tokio::test]
    async fn query_ranks_and_filters() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert_batch(vec![
                record("same", vec![1.0, 0.0], "a", true),
                record("close", vec![1.0, 0.2], "a", true),
                record("off", vec![0.0, 1.0], "a", true),
                record("hidden", vec![1.0, 0.0], "a", false),
            ])
            .await
            .unwrap();

        let hits = index
            .query(&[1.0, 0.0], 5, &QueryFilter::active_in(None), 0.5)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["same", "close"]);
    }

    #[tokio::test]
    async fn delete_by_source_only_touches_that_source() {
        let index = InMemoryVectorIndex::new();
        index.upsert(record("1", vec![1.0], "gstock", true)).await.unwrap();
        index.upsert(record("2", vec![1.0], "manual", true)).await.unwrap();
        index.delete_by_source("gstock").await.unwrap();
        assert!(!index.contains("1"));
        assert!(index.contains("2"));
    }

    #[tokio::test]
    async fn upsert_overwrites_metadata() {
        let index = InMemoryVectorIndex::new();
        index.upsert(record("1", vec![1.0], "s", true)).await.unwrap();
        index.upsert(record("1", vec![1.0], "s", false)).await.unwrap();
        assert_eq!(index.len(), 1);
        assert!(!index.get("1").unwrap().metadata.active);
    }
}
