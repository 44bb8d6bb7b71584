//! In-memory [`KnowledgeStore`] implementation for tests and embedded use.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Listing sorts on every call.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::KnowledgeEntry;

use super::{DedupKey, EntryFilter, KnowledgeStore};

/// In-memory knowledge store.
pub struct InMemoryKnowledgeStore {
    entries: RwLock<HashMap<String, KnowledgeEntry>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored entries, active or not.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryKnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("knowledge store lock poisoned")
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn insert_entry(&self, entry: &KnowledgeEntry) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        if entries.contains_key(&entry.id) {
            anyhow::bail!("duplicate knowledge entry id: {}", entry.id);
        }
        entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn update_entry(&self, entry: &KnowledgeEntry) -> Result<bool> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        match entries.get_mut(&entry.id) {
            Some(existing) => {
                let created_at = existing.created_at;
                *existing = entry.clone();
                existing.created_at = created_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<Option<KnowledgeEntry>> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        Ok(entries.get_mut(id).map(|e| {
            e.active = active;
            e.updated_at = chrono::Utc::now().timestamp();
            e.clone()
        }))
    }

    async fn get_entry(&self, id: &str) -> Result<Option<KnowledgeEntry>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(id).cloned())
    }

    async fn get_active_by_ids(&self, ids: &[String]) -> Result<Vec<KnowledgeEntry>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(ids
            .iter()
            .filter_map(|id| entries.get(id))
            .filter(|e| e.active)
            .cloned()
            .collect())
    }

    async fn find_dedup_keys(&self, hashes: &[String]) -> Result<Vec<DedupKey>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .values()
            .filter(|e| hashes.contains(&e.content_hash))
            .map(DedupKey::of)
            .collect())
    }

    async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<KnowledgeEntry>> {
        let entries = self.entries.read().map_err(poisoned)?;
        let mut out: Vec<KnowledgeEntry> = entries
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.source.cmp(&b.source).then_with(|| a.title.cmp(&b.title)));
        Ok(out)
    }

    async fn delete_entry(&self, id: &str) -> Result<bool> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        Ok(entries.remove(id).is_some())
    }

    async fn delete_by_source(&self, source: &str) -> Result<u64> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let before = entries.len();
        entries.retain(|_, e| e.source != source);
        Ok((before - entries.len()) as u64)
    }
}
