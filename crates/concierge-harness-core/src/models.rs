//! Core data models shared by the ingestion and retrieval pipelines.
//!
//! [`KnowledgeEntry`] is the durable unit of truth. [`VectorRecord`] is its
//! disposable projection into the vector index, and [`RetrievalHit`] is what
//! the index hands back for a query.

use serde::{Deserialize, Serialize};

/// Provenance tag applied to entries created one at a time.
pub const DEFAULT_MANUAL_SOURCE: &str = "manual";
/// Provenance tag applied to bulk-imported entries that carry none.
pub const DEFAULT_IMPORT_SOURCE: &str = "import";
/// Language assumed when an entry does not declare one.
pub const DEFAULT_LANGUAGE: &str = "es";

/// A retrievable unit of knowledge as persisted in the knowledge store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeEntry {
    /// Stable id, shared with the vector index.
    pub id: String,
    pub title: String,
    pub content: String,
    pub section: Option<String>,
    pub category_id: Option<String>,
    /// Provenance tag (importer name, `"manual"`, ...).
    pub source: String,
    pub language: String,
    /// Soft-delete flag. Inactive entries are never returned by retrieval.
    pub active: bool,
    /// See [`crate::content::compute_content_hash`].
    pub content_hash: String,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds.
    pub updated_at: i64,
}

impl KnowledgeEntry {
    /// Metadata shard stored next to this entry's vector.
    pub fn vector_metadata(&self) -> VectorMetadata {
        VectorMetadata {
            title: self.title.clone(),
            section: self.section.clone(),
            category_id: self.category_id.clone(),
            source: self.source.clone(),
            language: self.language.clone(),
            active: self.active,
        }
    }
}

/// Candidate entry handed to the ingestion pipeline.
///
/// Produced by importers and the document parser; content is assumed to be
/// already anonymized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntry {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl NewEntry {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Source tag with the bulk-import default applied.
    pub fn source_or_default(&self) -> &str {
        self.source.as_deref().unwrap_or(DEFAULT_IMPORT_SOURCE)
    }

    /// Language with the default applied.
    pub fn language_or_default(&self) -> &str {
        self.language.as_deref().unwrap_or(DEFAULT_LANGUAGE)
    }
}

/// Typed metadata stored with every vector.
///
/// Mirrors the subset of [`KnowledgeEntry`] the index needs for filtering,
/// so the store and the index cannot drift apart on field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorMetadata {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub source: String,
    pub language: String,
    pub active: bool,
}

/// A vector row: id, embedding and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// A single match returned by the vector index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalHit {
    pub id: String,
    /// Cosine similarity.
    pub score: f32,
}

impl RetrievalHit {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// Outcome of one phase of a sync run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPhaseResult {
    pub phase: String,
    pub source: String,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Summary of an ingestion/sync run, returned to the caller for display.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub phases: Vec<SyncPhaseResult>,
    /// Knowledge-base entries written during the run.
    pub kb_entries: u64,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

impl SyncReport {
    /// Append a phase, folding its counts and errors into the totals.
    pub fn push_phase(&mut self, phase: SyncPhaseResult) {
        self.kb_entries += phase.created + phase.updated;
        self.errors.extend(
            phase
                .errors
                .iter()
                .map(|e| format!("[{}] {}", phase.phase, e)),
        );
        self.phases.push(phase);
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_defaults() {
        let e = NewEntry::new("Terraza", "Tenemos terraza");
        assert_eq!(e.source_or_default(), DEFAULT_IMPORT_SOURCE);
        assert_eq!(e.language_or_default(), DEFAULT_LANGUAGE);

        let e = e.with_source("gstock").with_language("en");
        assert_eq!(e.source_or_default(), "gstock");
        assert_eq!(e.language_or_default(), "en");
    }

    #[test]
    fn new_entry_deserializes_camel_case() {
        let e: NewEntry = serde_json::from_str(
            r#"{"title":"Parking","content":"Hay parking","categoryId":"cat-1"}"#,
        )
        .unwrap();
        assert_eq!(e.category_id.as_deref(), Some("cat-1"));
        assert!(e.section.is_none());
    }

    #[test]
    fn report_folds_phase_totals() {
        let mut report = SyncReport::default();
        report.push_phase(SyncPhaseResult {
            phase: "recipes".into(),
            source: "gstock".into(),
            created: 3,
            errors: vec!["bad row".into()],
            ..Default::default()
        });
        report.push_phase(SyncPhaseResult {
            phase: "faq".into(),
            source: "faq".into(),
            created: 2,
            ..Default::default()
        });
        assert_eq!(report.kb_entries, 5);
        assert_eq!(report.errors, vec!["[recipes] bad row".to_string()]);
        assert!(!report.is_clean());
    }

    #[test]
    fn metadata_omits_absent_optionals() {
        let meta = VectorMetadata {
            title: "Horario".into(),
            section: None,
            category_id: None,
            source: "manual".into(),
            language: "es".into(),
            active: true,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("section").is_none());
        assert_eq!(json["source"], "manual");
    }
}
