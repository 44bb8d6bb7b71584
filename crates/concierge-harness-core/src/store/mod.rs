//! Storage abstraction for knowledge entries.
//!
//! The [`KnowledgeStore`] trait defines every persistence operation the
//! ingestion and retrieval pipelines need, enabling pluggable backends
//! (SQLite in the app crate, [`memory::InMemoryKnowledgeStore`] here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::models::KnowledgeEntry;

/// Deduplication key: at most one entry per triple when dedup is requested.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub content_hash: String,
    pub source: String,
    pub language: String,
}

impl DedupKey {
    pub fn new(
        content_hash: impl Into<String>,
        source: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            content_hash: content_hash.into(),
            source: source.into(),
            language: language.into(),
        }
    }

    pub fn of(entry: &KnowledgeEntry) -> Self {
        Self::new(&entry.content_hash, &entry.source, &entry.language)
    }
}

/// Listing filter. `None` fields do not constrain the result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryFilter {
    pub category_id: Option<String>,
    pub source: Option<String>,
    pub active: Option<bool>,
}

impl EntryFilter {
    pub fn matches(&self, entry: &KnowledgeEntry) -> bool {
        if let Some(ref c) = self.category_id {
            if entry.category_id.as_deref() != Some(c.as_str()) {
                return false;
            }
        }
        if let Some(ref s) = self.source {
            if &entry.source != s {
                return false;
            }
        }
        if let Some(a) = self.active {
            if entry.active != a {
                return false;
            }
        }
        true
    }
}

/// Durable record of knowledge entries.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_entry`](KnowledgeStore::insert_entry) | Persist a new entry |
/// | [`update_entry`](KnowledgeStore::update_entry) | Overwrite an existing entry |
/// | [`set_active`](KnowledgeStore::set_active) | Flip the soft-delete flag |
/// | [`get_entry`](KnowledgeStore::get_entry) | Fetch one entry by id |
/// | [`get_active_by_ids`](KnowledgeStore::get_active_by_ids) | Resolve retrieval hits |
/// | [`find_dedup_keys`](KnowledgeStore::find_dedup_keys) | Existing keys for a hash set |
/// | [`list_entries`](KnowledgeStore::list_entries) | Filtered listing |
/// | [`delete_entry`](KnowledgeStore::delete_entry) | Remove one entry |
/// | [`delete_by_source`](KnowledgeStore::delete_by_source) | Remove a whole provenance slice |
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn insert_entry(&self, entry: &KnowledgeEntry) -> Result<()>;

    /// Overwrite title, content, section, category, source, language,
    /// active, hash and `updated_at`. Returns `false` when the id is unknown.
    async fn update_entry(&self, entry: &KnowledgeEntry) -> Result<bool>;

    /// Returns the updated entry, or `None` when the id is unknown.
    async fn set_active(&self, id: &str, active: bool) -> Result<Option<KnowledgeEntry>>;

    async fn get_entry(&self, id: &str) -> Result<Option<KnowledgeEntry>>;

    /// Active entries among `ids`, in no particular order.
    async fn get_active_by_ids(&self, ids: &[String]) -> Result<Vec<KnowledgeEntry>>;

    /// Dedup keys of every stored entry whose hash is in `hashes`.
    async fn find_dedup_keys(&self, hashes: &[String]) -> Result<Vec<DedupKey>>;

    /// Entries matching `filter`, ordered by `(source, title)`.
    async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<KnowledgeEntry>>;

    /// Returns `false` when the id is unknown.
    async fn delete_entry(&self, id: &str) -> Result<bool>;

    /// Returns the number of deleted rows.
    async fn delete_by_source(&self, source: &str) -> Result<u64>;
}
