//! Turn tracing and staff feedback.
//!
//! After every agent turn a `queries` row and exactly one
//! `query_resolutions` row are written in one transaction. Tracing is
//! best-effort: a failure is logged and the turn's answer is still returned.
//! Feedback later lands on the newest resolution of the newest matching query.
//!
//! Staff can also answer a query by hand with
//! [`TraceRecorder::resolve_manually`], which appends a `HUMAN` resolution
//! and marks the query `RESOLVED`. The query's `resolved_by` keeps the
//! asking actor, so later feedback from that actor rates the human answer.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use crate::config::TraceConfig;
use crate::operations;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryStatus {
    Open,
    Resolved,
}

impl QueryStatus {
    /// `RESOLVED` when the turn found any knowledge at all.
    pub fn for_score(top_score: f32) -> Self {
        if top_score > 0.0 {
            QueryStatus::Resolved
        } else {
            QueryStatus::Open
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::Open => "OPEN",
            QueryStatus::Resolved => "RESOLVED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionSource {
    Ai,
    Human,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSource::Ai => "AI",
            ResolutionSource::Human => "HUMAN",
        }
    }
}

/// Thumbs up (`+1`) or down (`-1`). No other value can be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Feedback {
    Positive,
    Negative,
}

impl TryFrom<i64> for Feedback {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Feedback::Positive),
            -1 => Ok(Feedback::Negative),
            other => Err(format!("feedback must be 1 or -1, got {}", other)),
        }
    }
}

impl From<Feedback> for i64 {
    fn from(f: Feedback) -> i64 {
        match f {
            Feedback::Positive => 1,
            Feedback::Negative => -1,
        }
    }
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("No se encontró la resolución")]
    NoMatchingResolution,
    #[error("Consulta no encontrada: {0}")]
    QueryNotFound(String),
    #[error("responseText must not be empty")]
    EmptyResponse,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<sqlx::Error> for TraceError {
    fn from(e: sqlx::Error) -> Self {
        TraceError::Storage(e.into())
    }
}

/// A stored query with its latest resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTrace {
    pub id: String,
    pub guest_input: String,
    pub channel: String,
    pub status: String,
    pub confidence_score: f32,
    pub resolved_by: Option<String>,
    pub category_id: String,
    pub created_at: i64,
    pub resolution: Option<ResolutionTrace>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionTrace {
    pub id: String,
    pub response_text: String,
    pub source: String,
    pub feedback: Option<i64>,
}

#[derive(Clone)]
pub struct TraceRecorder {
    pool: SqlitePool,
    enabled: bool,
    channel: String,
}

impl TraceRecorder {
    pub fn new(pool: SqlitePool, config: &TraceConfig) -> Self {
        Self {
            pool,
            enabled: config.enabled,
            channel: config.channel.clone(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Record a finished turn. Returns the new query id, or `None` when
    /// tracing is off, no triage category exists, or the write failed.
    pub async fn on_turn_finish(
        &self,
        final_text: &str,
        user_query: &str,
        top_score: f32,
        actor_id: Option<&str>,
    ) -> Option<String> {
        if !self.enabled {
            return None;
        }
        match self.record(final_text, user_query, top_score, actor_id).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("trace write failed: {:#}", e);
                None
            }
        }
    }

    async fn record(
        &self,
        final_text: &str,
        user_query: &str,
        top_score: f32,
        actor_id: Option<&str>,
    ) -> Result<Option<String>> {
        let Some(category) = operations::default_category(&self.pool).await? else {
            tracing::debug!("no query category configured, skipping trace");
            return Ok(None);
        };

        let query_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();
        let status = QueryStatus::for_score(top_score);

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO queries (id, guest_input, channel, status, confidence_score, resolved_by, category_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&query_id)
        .bind(user_query)
        .bind(&self.channel)
        .bind(status.as_str())
        .bind(top_score as f64)
        .bind(actor_id)
        .bind(&category.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO query_resolutions (id, query_id, response_text, source, feedback, created_at) \
             VALUES (?, ?, ?, ?, NULL, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&query_id)
        .bind(final_text)
        .bind(ResolutionSource::Ai.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::debug!(query_id = %query_id, status = status.as_str(), top_score, "turn traced");
        Ok(Some(query_id))
    }

    /// Attach feedback to the newest resolution of the newest query matching
    /// `(user_query, actor_id, channel)`. Returns the updated resolution id.
    pub async fn submit_feedback(
        &self,
        user_query: &str,
        actor_id: Option<&str>,
        channel: &str,
        feedback: Feedback,
    ) -> Result<String, TraceError> {
        let row = sqlx::query(
            r#"
            SELECT r.id AS resolution_id
            FROM queries q
            JOIN query_resolutions r ON r.query_id = q.id
            WHERE q.id = (
                SELECT id FROM queries
                WHERE guest_input = ? AND resolved_by IS ? AND channel = ?
                ORDER BY created_at DESC, rowid DESC
                LIMIT 1
            )
            ORDER BY r.created_at DESC, r.rowid DESC
            LIMIT 1
            "#,
        )
        .bind(user_query)
        .bind(actor_id)
        .bind(channel)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(TraceError::NoMatchingResolution);
        };
        let resolution_id: String = row.get("resolution_id");

        sqlx::query("UPDATE query_resolutions SET feedback = ? WHERE id = ?")
            .bind(i64::from(feedback))
            .bind(&resolution_id)
            .execute(&self.pool)
            .await?;

        Ok(resolution_id)
    }

    /// Answer `query_id` by hand. Returns the new resolution id.
    pub async fn resolve_manually(&self, query_id: &str, response_text: &str) -> Result<String, TraceError> {
        let response_text = response_text.trim();
        if response_text.is_empty() {
            return Err(TraceError::EmptyResponse);
        }

        let resolution_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query("UPDATE queries SET status = ? WHERE id = ?")
            .bind(QueryStatus::Resolved.as_str())
            .bind(query_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(TraceError::QueryNotFound(query_id.to_string()));
        }

        sqlx::query(
            "INSERT INTO query_resolutions (id, query_id, response_text, source, feedback, created_at) \
             VALUES (?, ?, ?, ?, NULL, ?)",
        )
        .bind(&resolution_id)
        .bind(query_id)
        .bind(response_text)
        .bind(ResolutionSource::Human.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(query_id, resolution_id = %resolution_id, "query resolved manually");
        Ok(resolution_id)
    }

    /// Newest traces first, each with its latest resolution.
    pub async fn recent(&self, limit: usize) -> Result<Vec<QueryTrace>> {
        let rows = sqlx::query(
            r#"
            SELECT q.id, q.guest_input, q.channel, q.status, q.confidence_score, q.resolved_by,
                   q.category_id, q.created_at,
                   r.id AS resolution_id, r.response_text, r.source, r.feedback
            FROM queries q
            LEFT JOIN query_resolutions r ON r.id = (
                SELECT id FROM query_resolutions
                WHERE query_id = q.id
                ORDER BY created_at DESC, rowid DESC
                LIMIT 1
            )
            ORDER BY q.created_at DESC, q.rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let resolution_id: Option<String> = row.get("resolution_id");
                QueryTrace {
                    id: row.get("id"),
                    guest_input: row.get("guest_input"),
                    channel: row.get("channel"),
                    status: row.get("status"),
                    confidence_score: row.get::<f64, _>("confidence_score") as f32,
                    resolved_by: row.get("resolved_by"),
                    category_id: row.get("category_id"),
                    created_at: row.get("created_at"),
                    resolution: resolution_id.map(|id| ResolutionTrace {
                        id,
                        response_text: row.get("response_text"),
                        source: row.get("source"),
                        feedback: row.get("feedback"),
                    }),
                }
            })
            .collect())
    }
}
