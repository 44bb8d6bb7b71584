//! SQLite-backed [`VectorIndex`]: vectors as little-endian BLOBs in
//! `knowledge_vectors`, ranked by brute-force cosine similarity.
//!
//! Adequate for knowledge bases of a few thousand entries. Larger
//! deployments use the Pinecone backend ([`crate::pinecone`]).

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use concierge_harness_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use concierge_harness_core::index::{rank_hits, QueryFilter, VectorIndex};
use concierge_harness_core::models::{RetrievalHit, VectorRecord};

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

async fn upsert_one<'e, E>(executor: E, record: &VectorRecord, now: i64) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let meta = &record.metadata;
    sqlx::query(
        r#"
        INSERT INTO knowledge_vectors (entry_id, title, section, category_id, source, language,
                                       active, dims, embedding, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(entry_id) DO UPDATE SET
            title = excluded.title,
            section = excluded.section,
            category_id = excluded.category_id,
            source = excluded.source,
            language = excluded.language,
            active = excluded.active,
            dims = excluded.dims,
            embedding = excluded.embedding,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&record.id)
    .bind(&meta.title)
    .bind(&meta.section)
    .bind(&meta.category_id)
    .bind(&meta.source)
    .bind(&meta.language)
    .bind(meta.active as i64)
    .bind(record.vector.len() as i64)
    .bind(vec_to_blob(&record.vector))
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        upsert_one(&self.pool, &record, chrono::Utc::now().timestamp()).await
    }

    async fn upsert_batch(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for record in &records {
            upsert_one(&mut *tx, record, now).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM knowledge_vectors WHERE entry_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_by_source(&self, source: &str) -> Result<()> {
        sqlx::query("DELETE FROM knowledge_vectors WHERE source = ?")
            .bind(source)
            .execute(&self.pool)
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
        let mut sql = String::from("SELECT entry_id, embedding FROM knowledge_vectors WHERE dims = ?");
        if filter.active_only {
            sql.push_str(" AND active = 1");
        }
        if filter.category_id.is_some() {
            sql.push_str(" AND category_id = ?");
        }
        if filter.source.is_some() {
            sql.push_str(" AND source = ?");
        }

        let mut query = sqlx::query(&sql).bind(vector.len() as i64);
        if let Some(ref category_id) = filter.category_id {
            query = query.bind(category_id);
        }
        if let Some(ref source) = filter.source {
            query = query.bind(source);
        }

        let rows = query.fetch_all(&self.pool).await?;
        let hits = rows
            .iter()
            .map(|row| {
                let id: String = row.get("entry_id");
                let blob: Vec<u8> = row.get("embedding");
                RetrievalHit::new(id, cosine_similarity(vector, &blob_to_vec(&blob)))
            })
            .collect();

        Ok(rank_hits(hits, top_k, score_floor))
    }
}
