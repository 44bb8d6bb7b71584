use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Knowledge base
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS knowledge_entries (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            section TEXT,
            category_id TEXT,
            source TEXT NOT NULL,
            language TEXT NOT NULL DEFAULT 'es',
            active INTEGER NOT NULL DEFAULT 1,
            content_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Vector projection used by the sqlite index backend
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS knowledge_vectors (
            entry_id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            section TEXT,
            category_id TEXT,
            source TEXT NOT NULL,
            language TEXT NOT NULL,
            active INTEGER NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Triage categories
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS query_categories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Operations data read by the assistant tools
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reservations (
            id TEXT PRIMARY KEY,
            guest_name TEXT NOT NULL,
            guest_phone TEXT,
            date TEXT NOT NULL,
            time TEXT NOT NULL,
            party_size INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            notes TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS incidents (
            id TEXT PRIMARY KEY,
            type TEXT NOT NULL,
            description TEXT NOT NULL,
            severity TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'OPEN',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS weather_alerts (
            id TEXT PRIMARY KEY,
            alert_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            description TEXT NOT NULL,
            forecast_date TEXT NOT NULL,
            precipitation_mm REAL,
            wind_speed_kmh REAL,
            temperature_c REAL,
            action TEXT,
            status TEXT NOT NULL DEFAULT 'ACTIVE',
            triggered_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS waiting_list (
            id TEXT PRIMARY KEY,
            guest_name TEXT NOT NULL,
            party_size INTEGER NOT NULL,
            requested_date TEXT NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            notes TEXT,
            notified INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Turn traces
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queries (
            id TEXT PRIMARY KEY,
            guest_input TEXT NOT NULL,
            channel TEXT NOT NULL,
            status TEXT NOT NULL,
            confidence_score REAL NOT NULL,
            resolved_by TEXT,
            category_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (category_id) REFERENCES query_categories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS query_resolutions (
            id TEXT PRIMARY KEY,
            query_id TEXT NOT NULL,
            response_text TEXT NOT NULL,
            source TEXT NOT NULL,
            feedback INTEGER,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (query_id) REFERENCES queries(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes
    for stmt in [
        "CREATE INDEX IF NOT EXISTS idx_entries_dedup ON knowledge_entries(content_hash, source, language)",
        "CREATE INDEX IF NOT EXISTS idx_entries_source ON knowledge_entries(source)",
        "CREATE INDEX IF NOT EXISTS idx_vectors_source ON knowledge_vectors(source)",
        "CREATE INDEX IF NOT EXISTS idx_reservations_date ON reservations(date, time)",
        "CREATE INDEX IF NOT EXISTS idx_waiting_list_date ON waiting_list(requested_date)",
        "CREATE INDEX IF NOT EXISTS idx_queries_lookup ON queries(guest_input, resolved_by, channel)",
        "CREATE INDEX IF NOT EXISTS idx_resolutions_query ON query_resolutions(query_id)",
    ] {
        sqlx::query(stmt).execute(pool).await?;
    }

    Ok(())
}
