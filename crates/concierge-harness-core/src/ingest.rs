//! Ingestion pipeline: knowledge store and vector index kept in lockstep.
//!
//! Every write path follows the same ordering rule: the store row is written
//! first and its vector is upserted afterwards, and on delete the vector goes
//! first. A row without a vector is recoverable by resync or
//! [`KnowledgeBase::reindex`]; a vector without a row must never exist.
//!
//! # Paths
//!
//! | Method | Dedup | Embedding failure |
//! |--------|-------|-------------------|
//! | [`bulk_import`](KnowledgeBase::bulk_import) | optional, by `(hash, source, language)` | error, nothing written |
//! | [`sync_by_source`](KnowledgeBase::sync_by_source) | none (slate wiped first) | rows kept without vectors, warning |
//! | [`create`](KnowledgeBase::create) / [`update`](KnowledgeBase::update) / [`set_active`](KnowledgeBase::set_active) | none | logged, row kept |

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::content::{build_embedding_text, compute_content_hash};
use crate::embedding::Embedder;
use crate::error::{KnowledgeError, KnowledgeResult};
use crate::index::VectorIndex;
use crate::models::{KnowledgeEntry, NewEntry, VectorRecord, DEFAULT_MANUAL_SOURCE};
use crate::store::{DedupKey, EntryFilter, KnowledgeStore};

/// Result of [`KnowledgeBase::bulk_import`] and [`KnowledgeBase::sync_by_source`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportOutcome {
    pub created: u64,
    pub skipped: u64,
    /// Non-fatal problems, e.g. a vector flush that failed after rows were written.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Result of [`KnowledgeBase::reindex`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReindexOutcome {
    pub indexed: u64,
    pub failed: u64,
}

/// What an import does when the batch embedding call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmbedFailure {
    /// Return the error before any row is written.
    Abort,
    /// Write the rows anyway and report them for reindexing.
    StoreWithoutVectors,
}

/// Facade over the store, the vector index and the embedding provider.
#[derive(Clone)]
pub struct KnowledgeBase {
    store: Arc<dyn KnowledgeStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl KnowledgeBase {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
        }
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Import many entries with one batch embedding call.
    ///
    /// With `skip_duplicates`, entries whose `(hash, source, language)` already
    /// exists in the store (or earlier in the same batch) are dropped before
    /// anything is embedded.
    pub async fn bulk_import(
        &self,
        entries: &[NewEntry],
        skip_duplicates: bool,
    ) -> KnowledgeResult<ImportOutcome> {
        validate_entries(entries)?;

        let hashes: Vec<String> = entries
            .iter()
            .map(|e| compute_content_hash(&e.title, &e.content))
            .collect();

        let mut to_process: Vec<usize> = (0..entries.len()).collect();
        if skip_duplicates {
            let mut unique: Vec<String> = hashes.clone();
            unique.sort();
            unique.dedup();
            let mut seen: HashSet<DedupKey> = self
                .store
                .find_dedup_keys(&unique)
                .await?
                .into_iter()
                .collect();
            to_process.retain(|&i| {
                let key = DedupKey::new(
                    &hashes[i],
                    entries[i].source_or_default(),
                    entries[i].language_or_default(),
                );
                seen.insert(key)
            });
        }
        let skipped = (entries.len() - to_process.len()) as u64;

        if to_process.is_empty() {
            return Ok(ImportOutcome {
                created: 0,
                skipped,
                warnings: Vec::new(),
            });
        }

        self.write_rows(entries, &to_process, &hashes, skipped, EmbedFailure::Abort)
            .await
    }

    /// Insert `entries[i]` for every `i` in `to_process`, then flush their
    /// vectors in one batch.
    async fn write_rows(
        &self,
        entries: &[NewEntry],
        to_process: &[usize],
        hashes: &[String],
        skipped: u64,
        on_embed_failure: EmbedFailure,
    ) -> KnowledgeResult<ImportOutcome> {
        let mut warnings = Vec::new();
        let texts: Vec<String> = to_process
            .iter()
            .map(|&i| {
                let e = &entries[i];
                build_embedding_text(&e.title, &e.content, e.section.as_deref())
            })
            .collect();
        let vectors = match self.embed_all(&texts).await {
            Ok(vectors) => Some(vectors),
            Err(err) if on_embed_failure == EmbedFailure::StoreWithoutVectors => {
                tracing::warn!(
                    entries = to_process.len(),
                    "embedding failed, storing rows without vectors: {:#}",
                    err
                );
                warnings.push(format!(
                    "{} entries stored without vectors (run reindex to repair): {}",
                    to_process.len(),
                    err
                ));
                None
            }
            Err(err) => return Err(err),
        };

        let now = chrono::Utc::now().timestamp();
        let mut written: u64 = 0;
        let mut staged: Vec<VectorRecord> = Vec::with_capacity(to_process.len());
        let mut vectors = vectors.map(|v| v.into_iter());

        for &i in to_process {
            let e = &entries[i];
            let entry = KnowledgeEntry {
                id: Uuid::new_v4().to_string(),
                title: e.title.clone(),
                content: e.content.clone(),
                section: e.section.clone(),
                category_id: e.category_id.clone(),
                source: e.source_or_default().to_string(),
                language: e.language_or_default().to_string(),
                active: true,
                content_hash: hashes[i].clone(),
                created_at: now,
                updated_at: now,
            };

            if let Err(err) = self.store.insert_entry(&entry).await {
                tracing::error!(
                    position = i,
                    written,
                    "import stopped on store failure: {:#}",
                    err
                );
                // Rows written so far exist; their vectors are safe to flush.
                if !staged.is_empty() {
                    if let Err(flush_err) = self.index.upsert_batch(staged).await {
                        tracing::warn!("vector flush after store failure failed: {:#}", flush_err);
                    }
                }
                return Err(err.into());
            }
            written += 1;

            if let Some(vector) = vectors.as_mut().and_then(|v| v.next()) {
                staged.push(VectorRecord {
                    id: entry.id.clone(),
                    vector,
                    metadata: entry.vector_metadata(),
                });
            }
        }

        let created = written;
        if !staged.is_empty() {
            if let Err(err) = self.index.upsert_batch(staged).await {
                tracing::warn!(created, "vector batch upsert failed: {:#}", err);
                warnings.push(format!(
                    "{} entries stored without vectors (run reindex to repair): {}",
                    created, err
                ));
            }
        }

        tracing::info!(created, skipped, "import finished");
        Ok(ImportOutcome {
            created,
            skipped,
            warnings,
        })
    }

    async fn embed_all(&self, texts: &[String]) -> KnowledgeResult<Vec<Vec<f32>>> {
        let vectors = self.embedder.embed_batch(texts).await?;
        if vectors.len() != texts.len() {
            return Err(KnowledgeError::Dependency(anyhow::anyhow!(
                "embedding provider returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }

    /// Replace every entry tagged `source` with `entries`.
    ///
    /// Vector deletion is best-effort: an index outage must not block the
    /// store-level resync, and the next full resync repairs the index. If the
    /// new entries cannot be embedded they are still stored, without vectors,
    /// and the outcome carries a warning.
    pub async fn sync_by_source(
        &self,
        source: &str,
        entries: Vec<NewEntry>,
    ) -> KnowledgeResult<ImportOutcome> {
        if source.trim().is_empty() {
            return Err(KnowledgeError::InvalidEntry {
                index: 0,
                reason: "source must not be empty".to_string(),
            });
        }
        validate_entries(&entries)?;

        if let Err(err) = self.index.delete_by_source(source).await {
            tracing::warn!(source, "deleting vectors for source failed: {:#}", err);
        }
        let removed = self.store.delete_by_source(source).await?;
        tracing::info!(source, removed, "cleared source before resync");

        if entries.is_empty() {
            return Ok(ImportOutcome::default());
        }

        let entries: Vec<NewEntry> = entries
            .into_iter()
            .map(|e| e.with_source(source))
            .collect();
        let hashes: Vec<String> = entries
            .iter()
            .map(|e| compute_content_hash(&e.title, &e.content))
            .collect();
        let to_process: Vec<usize> = (0..entries.len()).collect();
        self.write_rows(
            &entries,
            &to_process,
            &hashes,
            0,
            EmbedFailure::StoreWithoutVectors,
        )
        .await
    }

    /// Create a single entry. Defaults `source` to `"manual"`.
    pub async fn create(&self, new: NewEntry) -> KnowledgeResult<KnowledgeEntry> {
        validate_entries(std::slice::from_ref(&new))?;
        let now = chrono::Utc::now().timestamp();
        let entry = KnowledgeEntry {
            id: Uuid::new_v4().to_string(),
            content_hash: compute_content_hash(&new.title, &new.content),
            source: new
                .source
                .clone()
                .unwrap_or_else(|| DEFAULT_MANUAL_SOURCE.to_string()),
            language: new.language_or_default().to_string(),
            title: new.title,
            content: new.content,
            section: new.section,
            category_id: new.category_id,
            active: true,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_entry(&entry).await?;
        self.refresh_vector(&entry).await;
        Ok(entry)
    }

    /// Edit an entry's text and classification; hash and embedding are regenerated.
    ///
    /// `source` and `language` keep their stored values unless `changes` sets them.
    pub async fn update(&self, id: &str, changes: NewEntry) -> KnowledgeResult<KnowledgeEntry> {
        validate_entries(std::slice::from_ref(&changes))?;
        let existing = self
            .store
            .get_entry(id)
            .await?
            .ok_or_else(|| KnowledgeError::NotFound(id.to_string()))?;

        let entry = KnowledgeEntry {
            id: existing.id,
            content_hash: compute_content_hash(&changes.title, &changes.content),
            title: changes.title,
            content: changes.content,
            section: changes.section,
            category_id: changes.category_id,
            source: changes.source.unwrap_or(existing.source),
            language: changes.language.unwrap_or(existing.language),
            active: existing.active,
            created_at: existing.created_at,
            updated_at: chrono::Utc::now().timestamp(),
        };
        if !self.store.update_entry(&entry).await? {
            return Err(KnowledgeError::NotFound(id.to_string()));
        }
        self.refresh_vector(&entry).await;
        Ok(entry)
    }

    /// Activate or deactivate an entry and refresh its vector metadata.
    pub async fn set_active(&self, id: &str, active: bool) -> KnowledgeResult<KnowledgeEntry> {
        let entry = self
            .store
            .set_active(id, active)
            .await?
            .ok_or_else(|| KnowledgeError::NotFound(id.to_string()))?;
        self.refresh_vector(&entry).await;
        Ok(entry)
    }

    /// Delete one entry. The vector is removed first; if that fails the row stays.
    pub async fn delete(&self, id: &str) -> KnowledgeResult<()> {
        if self.store.get_entry(id).await?.is_none() {
            return Err(KnowledgeError::NotFound(id.to_string()));
        }
        self.index.delete_by_ids(&[id.to_string()]).await?;
        if !self.store.delete_entry(id).await? {
            return Err(KnowledgeError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn list(&self, filter: &EntryFilter) -> KnowledgeResult<Vec<KnowledgeEntry>> {
        Ok(self.store.list_entries(filter).await?)
    }

    /// Re-embed and re-upsert every entry matching `filter`, `batch_size` at a time.
    ///
    /// Repairs entries that were stored while the embedding provider or the
    /// index was unavailable. Failed batches are counted, not propagated.
    pub async fn reindex(
        &self,
        filter: &EntryFilter,
        batch_size: usize,
    ) -> KnowledgeResult<ReindexOutcome> {
        let entries = self.store.list_entries(filter).await?;
        let mut outcome = ReindexOutcome::default();

        for batch in entries.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch
                .iter()
                .map(|e| build_embedding_text(&e.title, &e.content, e.section.as_deref()))
                .collect();
            let result = match self.embedder.embed_batch(&texts).await {
                Ok(vectors) if vectors.len() == batch.len() => {
                    let records = batch
                        .iter()
                        .zip(vectors)
                        .map(|(e, vector)| VectorRecord {
                            id: e.id.clone(),
                            vector,
                            metadata: e.vector_metadata(),
                        })
                        .collect();
                    self.index.upsert_batch(records).await
                }
                Ok(vectors) => Err(anyhow::anyhow!(
                    "embedding provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )),
                Err(err) => Err(err),
            };
            match result {
                Ok(()) => outcome.indexed += batch.len() as u64,
                Err(err) => {
                    tracing::warn!(size = batch.len(), "reindex batch failed: {:#}", err);
                    outcome.failed += batch.len() as u64;
                }
            }
        }

        Ok(outcome)
    }

    /// Embed one entry and upsert its vector. Failures are logged only.
    async fn refresh_vector(&self, entry: &KnowledgeEntry) {
        let text = build_embedding_text(&entry.title, &entry.content, entry.section.as_deref());
        let result = match self.embedder.embed(&text).await {
            Ok(vector) => {
                self.index
                    .upsert(VectorRecord {
                        id: entry.id.clone(),
                        vector,
                        metadata: entry.vector_metadata(),
                    })
                    .await
            }
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            tracing::warn!(id = %entry.id, "vector refresh failed, entry kept: {:#}", err);
        }
    }
}

/// Reject entries without a title or content before anything is written.
pub fn validate_entries(entries: &[NewEntry]) -> KnowledgeResult<()> {
    for (index, e) in entries.iter().enumerate() {
        if e.title.trim().is_empty() {
            return Err(KnowledgeError::InvalidEntry {
                index,
                reason: "title must not be empty".to_string(),
            });
        }
        if e.content.trim().is_empty() {
            return Err(KnowledgeError::InvalidEntry {
                index,
                reason: "content must not be empty".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::InMemoryVectorIndex;
    use crate::index::QueryFilter;
    use crate::models::RetrievalHit;
    use crate::store::memory::InMemoryKnowledgeStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Counts batch calls and texts; can be switched to fail.
    #[derive(Default)]
    struct CountingEmbedder {
        batch_calls: AtomicUsize,
        texts: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("provider down");
            }
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0, 0.5])
                .collect())
        }
    }

    /// Index whose writes can be switched to fail.
    #[derive(Default)]
    struct FlakyIndex {
        inner: InMemoryVectorIndex,
        fail: AtomicBool,
    }

    impl FlakyIndex {
        fn check(&self) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("index unreachable");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl VectorIndex for FlakyIndex {
        async fn upsert(&self, record: VectorRecord) -> Result<()> {
            self.check()?;
            self.inner.upsert(record).await
        }
        async fn upsert_batch(&self, records: Vec<VectorRecord>) -> Result<()> {
            self.check()?;
            self.inner.upsert_batch(records).await
        }
        async fn delete_by_ids(&self, ids: &[String]) -> Result<()> {
            self.check()?;
            self.inner.delete_by_ids(ids).await
        }
        async fn delete_by_source(&self, source: &str) -> Result<()> {
            self.check()?;
            self.inner.delete_by_source(source).await
        }
        async fn query(
            &self,
            vector: &[f32],
            top_k: usize,
            filter: &QueryFilter,
            floor: f32,
        ) -> Result<Vec<RetrievalHit>> {
            self.inner.query(vector, top_k, filter, floor).await
        }
    }

    struct Fixture {
        kb: KnowledgeBase,
        store: Arc<InMemoryKnowledgeStore>,
        index: Arc<FlakyIndex>,
        embedder: Arc<CountingEmbedder>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let index = Arc::new(FlakyIndex::default());
        let embedder = Arc::new(CountingEmbedder::default());
        let kb = KnowledgeBase::new(store.clone(), index.clone(), embedder.clone());
        Fixture {
            kb,
            store,
            index,
            embedder,
        }
    }

    fn faq() -> Vec<NewEntry> {
        vec![
            NewEntry::new("Terraza", "Disponemos de terraza exterior climatizada.")
                .with_source("faq"),
            NewEntry::new("Parking", "Hay parking público a 200 metros.").with_source("faq"),
        ]
    }

    #[tokio::test]
    async fn second_import_with_dedup_creates_nothing() {
        let f = fixture();
        let first = f.kb.bulk_import(&faq(), true).await.unwrap();
        assert_eq!(first.created, 2);
        assert_eq!(first.skipped, 0);

        let second = f.kb.bulk_import(&faq(), true).await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(f.store.len(), 2);
        // Duplicates are filtered before any embedding call.
        assert_eq!(f.embedder.batch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dedup_key_includes_source_and_language() {
        let f = fixture();
        f.kb.bulk_import(&faq(), true).await.unwrap();

        let other_source: Vec<NewEntry> = faq().into_iter().map(|e| e.with_source("web")).collect();
        assert_eq!(f.kb.bulk_import(&other_source, true).await.unwrap().created, 2);

        let english: Vec<NewEntry> = faq().into_iter().map(|e| e.with_language("en")).collect();
        assert_eq!(f.kb.bulk_import(&english, true).await.unwrap().created, 2);
    }

    #[tokio::test]
    async fn dedup_collapses_repeats_within_one_batch() {
        let f = fixture();
        let mut entries = faq();
        entries.push(NewEntry::new(" TERRAZA ", "disponemos de terraza exterior climatizada.").with_source("faq"));
        let outcome = f.kb.bulk_import(&entries, true).await.unwrap();
        assert_eq!(outcome.created, 2);
        assert_eq!(outcome.skipped, 1);
    }

    #[tokio::test]
    async fn import_without_dedup_keeps_duplicates() {
        let f = fixture();
        f.kb.bulk_import(&faq(), false).await.unwrap();
        let again = f.kb.bulk_import(&faq(), false).await.unwrap();
        assert_eq!(again.created, 2);
        assert_eq!(f.store.len(), 4);
    }

    #[tokio::test]
    async fn one_batch_call_and_matching_vectors() {
        let f = fixture();
        f.kb.bulk_import(&faq(), true).await.unwrap();
        assert_eq!(f.embedder.batch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.embedder.texts.load(Ordering::SeqCst), 2);

        for entry in f.store.list_entries(&EntryFilter::default()).await.unwrap() {
            let record = f.index.inner.get(&entry.id).expect("vector for every row");
            assert_eq!(record.metadata, entry.vector_metadata());
            let expected_len =
                build_embedding_text(&entry.title, &entry.content, None).len() as f32;
            assert_eq!(record.vector[0], expected_len);
        }
    }

    #[tokio::test]
    async fn invalid_entry_fails_before_any_write() {
        let f = fixture();
        let mut entries = faq();
        entries.push(NewEntry::new("Sin contenido", "   "));
        let err = f.kb.bulk_import(&entries, true).await.unwrap_err();
        match err {
            KnowledgeError::InvalidEntry { index, .. } => assert_eq!(index, 2),
            other => panic!("unexpected error: {other}"),
        }
        assert!(f.store.is_empty());
        assert_eq!(f.embedder.batch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn embedding_failure_writes_nothing() {
        let f = fixture();
        f.embedder.fail.store(true, Ordering::SeqCst);
        let err = f.kb.bulk_import(&faq(), true).await.unwrap_err();
        assert!(matches!(err, KnowledgeError::Dependency(_)));
        assert!(f.store.is_empty());
        assert!(f.index.inner.is_empty());
    }

    #[tokio::test]
    async fn vector_flush_failure_keeps_rows_and_warns() {
        let f = fixture();
        f.index.fail.store(true, Ordering::SeqCst);
        let outcome = f.kb.bulk_import(&faq(), true).await.unwrap();
        assert_eq!(outcome.created, 2);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(f.store.len(), 2);
        assert!(f.index.inner.is_empty());
    }

    #[tokio::test]
    async fn resync_replaces_previous_rows() {
        let f = fixture();
        f.kb.create(NewEntry::new("Manual", "Entrada manual")).await.unwrap();

        let first: Vec<NewEntry> = vec![
            NewEntry::new("Receta A", "Ingredientes A"),
            NewEntry::new("Receta B", "Ingredientes B"),
            NewEntry::new("Receta C", "Ingredientes C"),
        ];
        f.kb.sync_by_source("gstock", first).await.unwrap();
        let first_ids: Vec<String> = f
            .kb
            .list(&EntryFilter {
                source: Some("gstock".into()),
                ..Default::default()
            })
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();

        let second = vec![
            NewEntry::new("Receta A", "Ingredientes A"),
            NewEntry::new("Receta D", "Ingredientes D"),
        ];
        let outcome = f.kb.sync_by_source("gstock", second.clone()).await.unwrap();
        assert_eq!(outcome.created, 2);

        let now = f
            .kb
            .list(&EntryFilter {
                source: Some("gstock".into()),
                active: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(now.len(), second.len());
        assert!(now.iter().all(|e| !first_ids.contains(&e.id)));
        for id in &first_ids {
            assert!(!f.index.inner.contains(id));
        }
        // Other sources are untouched.
        assert_eq!(f.store.len(), 3);
    }

    #[tokio::test]
    async fn resync_tolerates_vector_delete_failure() {
        let f = fixture();
        f.kb.sync_by_source("gstock", faq()).await.unwrap();
        f.index.fail.store(true, Ordering::SeqCst);

        let outcome = f
            .kb
            .sync_by_source("gstock", vec![NewEntry::new("Nueva", "Contenido nuevo")])
            .await
            .unwrap();
        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(f.store.len(), 1);
    }

    #[tokio::test]
    async fn resync_during_embedding_outage_keeps_rows() {
        let f = fixture();
        f.kb.sync_by_source("gstock", faq()).await.unwrap();
        f.embedder.fail.store(true, Ordering::SeqCst);

        let outcome = f
            .kb
            .sync_by_source(
                "gstock",
                vec![
                    NewEntry::new("Receta A", "Ingredientes A"),
                    NewEntry::new("Receta B", "Ingredientes B"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(outcome.created, 2);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("reindex"));

        let rows = f
            .kb
            .list(&EntryFilter {
                source: Some("gstock".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|e| e.source == "gstock"));
        assert!(f.index.inner.is_empty());

        f.embedder.fail.store(false, Ordering::SeqCst);
        let repaired = f.kb.reindex(&EntryFilter::default(), 10).await.unwrap();
        assert_eq!(repaired.indexed, 2);
        assert!(rows.iter().all(|e| f.index.inner.contains(&e.id)));
    }

    #[tokio::test]
    async fn resync_with_no_entries_only_clears() {
        let f = fixture();
        f.kb.sync_by_source("gstock", faq()).await.unwrap();
        let outcome = f.kb.sync_by_source("gstock", Vec::new()).await.unwrap();
        assert_eq!(outcome.created, 0);
        assert!(f.store.is_empty());
        assert!(f.index.inner.is_empty());
    }

    #[tokio::test]
    async fn create_survives_embedding_outage() {
        let f = fixture();
        f.embedder.fail.store(true, Ordering::SeqCst);
        let entry = f
            .kb
            .create(NewEntry::new("Alérgenos", "Carta de alérgenos disponible"))
            .await
            .unwrap();
        assert_eq!(entry.source, DEFAULT_MANUAL_SOURCE);
        assert!(f.store.get_entry(&entry.id).await.unwrap().is_some());
        assert!(!f.index.inner.contains(&entry.id));

        f.embedder.fail.store(false, Ordering::SeqCst);
        let outcome = f.kb.reindex(&EntryFilter::default(), 10).await.unwrap();
        assert_eq!(outcome, ReindexOutcome { indexed: 1, failed: 0 });
        assert!(f.index.inner.contains(&entry.id));
    }

    #[tokio::test]
    async fn update_regenerates_hash_and_vector() {
        let f = fixture();
        let entry = f.kb.create(NewEntry::new("Horario", "De 13 a 16")).await.unwrap();
        let updated = f
            .kb
            .update(&entry.id, NewEntry::new("Horario", "De 13 a 17").with_section("Comidas"))
            .await
            .unwrap();
        assert_ne!(updated.content_hash, entry.content_hash);
        assert_eq!(updated.source, entry.source);
        assert_eq!(updated.created_at, entry.created_at);
        let record = f.index.inner.get(&entry.id).unwrap();
        assert_eq!(record.metadata.section.as_deref(), Some("Comidas"));

        let missing = f.kb.update("nope", NewEntry::new("a", "b")).await.unwrap_err();
        assert!(matches!(missing, KnowledgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn set_active_updates_vector_metadata() {
        let f = fixture();
        let entry = f.kb.create(NewEntry::new("Terraza", "Abierta")).await.unwrap();
        let toggled = f.kb.set_active(&entry.id, false).await.unwrap();
        assert!(!toggled.active);
        assert!(!f.index.inner.get(&entry.id).unwrap().metadata.active);

        let err = f.kb.set_active("missing", true).await.unwrap_err();
        assert!(matches!(err, KnowledgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_vector_before_row() {
        let f = fixture();
        let entry = f.kb.create(NewEntry::new("Terraza", "Abierta")).await.unwrap();

        f.index.fail.store(true, Ordering::SeqCst);
        assert!(f.kb.delete(&entry.id).await.is_err());
        assert!(f.store.get_entry(&entry.id).await.unwrap().is_some());

        f.index.fail.store(false, Ordering::SeqCst);
        f.kb.delete(&entry.id).await.unwrap();
        assert!(f.store.get_entry(&entry.id).await.unwrap().is_none());
        assert!(!f.index.inner.contains(&entry.id));

        assert!(matches!(
            f.kb.delete(&entry.id).await.unwrap_err(),
            KnowledgeError::NotFound(_)
        ));
    }
}
