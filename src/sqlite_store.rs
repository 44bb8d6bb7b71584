//! SQLite-backed [`KnowledgeStore`] implementation.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use concierge_harness_core::models::KnowledgeEntry;
use concierge_harness_core::store::{DedupKey, EntryFilter, KnowledgeStore};

/// SQLite keeps at most 999 bound parameters per statement on older builds.
const MAX_BIND_PARAMS: usize = 500;

/// SQLite implementation of the [`KnowledgeStore`] trait over the
/// `knowledge_entries` table.
pub struct SqliteKnowledgeStore {
    pool: SqlitePool,
}

impl SqliteKnowledgeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const SELECT_COLUMNS: &str = "id, title, content, section, category_id, source, language, \
                              active, content_hash, created_at, updated_at";

fn row_to_entry(row: &SqliteRow) -> KnowledgeEntry {
    KnowledgeEntry {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        section: row.get("section"),
        category_id: row.get("category_id"),
        source: row.get("source"),
        language: row.get("language"),
        active: row.get::<i64, _>("active") != 0,
        content_hash: row.get("content_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn insert_entry(&self, entry: &KnowledgeEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO knowledge_entries (id, title, content, section, category_id, source,
                                           language, active, content_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.title)
        .bind(&entry.content)
        .bind(&entry.section)
        .bind(&entry.category_id)
        .bind(&entry.source)
        .bind(&entry.language)
        .bind(entry.active as i64)
        .bind(&entry.content_hash)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_entry(&self, entry: &KnowledgeEntry) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE knowledge_entries
            SET title = ?, content = ?, section = ?, category_id = ?, source = ?,
                language = ?, active = ?, content_hash = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&entry.title)
        .bind(&entry.content)
        .bind(&entry.section)
        .bind(&entry.category_id)
        .bind(&entry.source)
        .bind(&entry.language)
        .bind(entry.active as i64)
        .bind(&entry.content_hash)
        .bind(entry.updated_at)
        .bind(&entry.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<Option<KnowledgeEntry>> {
        let now = chrono::Utc::now().timestamp();
        let result =
            sqlx::query("UPDATE knowledge_entries SET active = ?, updated_at = ? WHERE id = ?")
                .bind(active as i64)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_entry(id).await
    }

    async fn get_entry(&self, id: &str) -> Result<Option<KnowledgeEntry>> {
        let sql = format!("SELECT {} FROM knowledge_entries WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_entry))
    }

    async fn get_active_by_ids(&self, ids: &[String]) -> Result<Vec<KnowledgeEntry>> {
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BIND_PARAMS) {
            let sql = format!(
                "SELECT {} FROM knowledge_entries WHERE active = 1 AND id IN ({})",
                SELECT_COLUMNS,
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id);
            }
            let rows = query.fetch_all(&self.pool).await?;
            out.extend(rows.iter().map(row_to_entry));
        }
        Ok(out)
    }

    async fn find_dedup_keys(&self, hashes: &[String]) -> Result<Vec<DedupKey>> {
        let mut out = Vec::new();
        for chunk in hashes.chunks(MAX_BIND_PARAMS) {
            let sql = format!(
                "SELECT DISTINCT content_hash, source, language FROM knowledge_entries \
                 WHERE content_hash IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for hash in chunk {
                query = query.bind(hash);
            }
            let rows = query.fetch_all(&self.pool).await?;
            out.extend(rows.iter().map(|row| DedupKey {
                content_hash: row.get("content_hash"),
                source: row.get("source"),
                language: row.get("language"),
            }));
        }
        Ok(out)
    }

    async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<KnowledgeEntry>> {
        let mut sql = format!("SELECT {} FROM knowledge_entries WHERE 1 = 1", SELECT_COLUMNS);
        if filter.category_id.is_some() {
            sql.push_str(" AND category_id = ?");
        }
        if filter.source.is_some() {
            sql.push_str(" AND source = ?");
        }
        if filter.active.is_some() {
            sql.push_str(" AND active = ?");
        }
        sql.push_str(" ORDER BY source ASC, title ASC");

        let mut query = sqlx::query(&sql);
        if let Some(ref category_id) = filter.category_id {
            query = query.bind(category_id);
        }
        if let Some(ref source) = filter.source {
            query = query.bind(source);
        }
        if let Some(active) = filter.active {
            query = query.bind(active as i64);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_entry).collect())
    }

    async fn delete_entry(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM knowledge_entries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_source(&self, source: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM knowledge_entries WHERE source = ?")
            .bind(source)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
