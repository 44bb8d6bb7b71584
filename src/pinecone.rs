//! Pinecone data-plane client implementing [`VectorIndex`].
//!
//! Talks to the index host directly (`/vectors/upsert`, `/vectors/delete`,
//! `/query`). Metadata is the serialized
//! [`VectorMetadata`](concierge_harness_core::models::VectorMetadata), so the
//! filter keys (`active`, `categoryId`, `source`) always match what was
//! written.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use concierge_harness_core::index::{rank_hits, QueryFilter, VectorIndex};
use concierge_harness_core::models::{RetrievalHit, VectorRecord};

use crate::config::VectorIndexConfig;
use crate::http;

const API_VERSION: &str = "2024-07";

pub struct PineconeIndex {
    client: reqwest::Client,
    host: String,
    api_key: String,
    namespace: Option<String>,
    upsert_batch_size: usize,
    max_retries: u32,
}

impl PineconeIndex {
    pub fn new(config: &VectorIndexConfig) -> Result<Self> {
        let host = config
            .host
            .clone()
            .ok_or_else(|| anyhow::anyhow!("vector_index.host required for Pinecone backend"))?;
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{}", host)
        };
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            host: host.trim_end_matches('/').to_string(),
            api_key: http::api_key_from_env(&config.api_key_env)?,
            namespace: config.namespace.clone(),
            upsert_batch_size: config.upsert_batch_size.max(1),
            max_retries: 3,
        })
    }

    async fn post(&self, path: &str, mut body: Value) -> Result<Value> {
        if let (Some(ns), Some(obj)) = (&self.namespace, body.as_object_mut()) {
            obj.insert("namespace".to_string(), json!(ns));
        }
        let url = format!("{}{}", self.host, path);
        http::post_json(
            &self.client,
            "Pinecone",
            &url,
            &[
                ("Api-Key", self.api_key.as_str()),
                ("X-Pinecone-API-Version", API_VERSION),
            ],
            &body,
            self.max_retries,
        )
        .await
    }
}

fn record_json(record: &VectorRecord) -> Result<Value> {
    Ok(json!({
        "id": record.id,
        "values": record.vector,
        "metadata": serde_json::to_value(&record.metadata)?,
    }))
}

/// Translate a [`QueryFilter`] into Pinecone's metadata filter language.
pub fn filter_json(filter: &QueryFilter) -> Value {
    let mut clauses = Map::new();
    if filter.active_only {
        clauses.insert("active".into(), json!({ "$eq": true }));
    }
    if let Some(ref category_id) = filter.category_id {
        clauses.insert("categoryId".into(), json!({ "$eq": category_id }));
    }
    if let Some(ref source) = filter.source {
        clauses.insert("source".into(), json!({ "$eq": source }));
    }
    Value::Object(clauses)
}

/// Extract `matches[].{id, score}` from a query response.
pub fn parse_matches(json: &Value) -> Vec<RetrievalHit> {
    json.get("matches")
        .and_then(|m| m.as_array())
        .map(|matches| {
            matches
                .iter()
                .filter_map(|m| {
                    let id = m.get("id")?.as_str()?;
                    let score = m.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0);
                    Some(RetrievalHit::new(id, score as f32))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        self.upsert_batch(vec![record]).await
    }

    async fn upsert_batch(&self, records: Vec<VectorRecord>) -> Result<()> {
        for batch in records.chunks(self.upsert_batch_size) {
            let vectors = batch.iter().map(record_json).collect::<Result<Vec<_>>>()?;
            self.post("/vectors/upsert", json!({ "vectors": vectors }))
                .await
                .with_context(|| format!("upserting {} vectors", batch.len()))?;
        }
        Ok(())
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.post("/vectors/delete", json!({ "ids": ids })).await?;
        Ok(())
    }

    async fn delete_by_source(&self, source: &str) -> Result<()> {
        self.post(
            "/vectors/delete",
            json!({ "filter": { "source": { "$eq": source } } }),
        )
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &QueryFilter,
        score_floor: f32,
    ) -> Result<Vec<RetrievalHit>> {
        let mut body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": false,
        });
        let f = filter_json(filter);
        if f.as_object().map(|o| !o.is_empty()).unwrap_or(false) {
            body["filter"] = f;
        }
        let response = self.post("/query", body).await?;
        Ok(rank_hits(parse_matches(&response), top_k, score_floor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_covers_active_category_and_source() {
        let f = QueryFilter {
            category_id: Some("espacios".into()),
            source: Some("faq".into()),
            active_only: true,
        };
        assert_eq!(
            filter_json(&f),
            json!({
                "active": { "$eq": true },
                "categoryId": { "$eq": "espacios" },
                "source": { "$eq": "faq" }
            })
        );
        assert_eq!(filter_json(&QueryFilter::default()), json!({}));
    }

    #[test]
    fn matches_are_parsed_and_tolerate_gaps() {
        let json = json!({
            "matches": [
                { "id": "a", "score": 0.9 },
                { "score": 0.5 },
                { "id": "b" }
            ]
        });
        let hits = parse_matches(&json);
        assert_eq!(hits, vec![RetrievalHit::new("a", 0.9), RetrievalHit::new("b", 0.0)]);
        assert!(parse_matches(&json!({})).is_empty());
    }
}
