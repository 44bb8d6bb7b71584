//! Two-stage retrieval: direct vector search, then HyDE escalation.
//!
//! # Algorithm
//!
//! 1. Embed the query and search the index for the top `top_k` active
//!    entries (optionally in one category) scoring at least `direct_floor`.
//! 2. If the best direct score is below `hyde_trigger`, ask the
//!    [`HypotheticalGenerator`] for a short hypothetical answer, embed
//!    `"{hypothetical}\n\n{query}"` and search again with the looser
//!    `hyde_floor`.
//! 3. Merge both lists with [`merge_hits`]: best score per id, descending,
//!    truncated to `top_k`.
//! 4. Resolve ids against the knowledge store (active rows only),
//!    preserving ranked order.
//!
//! The HyDE call is never issued before the direct top score is known, and
//! never issued at all when the direct stage is confident enough.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::embedding::{Embedder, HypotheticalGenerator};
use crate::index::{QueryFilter, VectorIndex};
use crate::models::RetrievalHit;
use crate::store::KnowledgeStore;

/// Message returned when neither stage finds anything relevant.
pub const NO_RESULTS_MESSAGE: &str = "No se encontró información relevante para esta consulta. \
     Sugiere al cliente contactar directamente con el restaurante.";

/// Message returned when the knowledge base could not be searched at all.
pub const RETRIEVAL_ERROR_MESSAGE: &str = "No se pudo consultar la base de conocimiento en este momento. \
     Inténtalo de nuevo más tarde o contacta directamente con el restaurante.";

/// Score thresholds and result size for [`Retriever`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalThresholds {
    /// Minimum score kept from the direct stage.
    pub direct_floor: f32,
    /// HyDE runs when the best direct score is below this.
    pub hyde_trigger: f32,
    /// Minimum score kept from the HyDE stage.
    pub hyde_floor: f32,
    pub top_k: usize,
}

impl Default for RetrievalThresholds {
    fn default() -> Self {
        Self {
            direct_floor: 0.65,
            hyde_trigger: 0.70,
            hyde_floor: 0.55,
            top_k: 5,
        }
    }
}

/// One knowledge entry as handed to the agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedEntry {
    pub id: String,
    pub title: String,
    pub section: Option<String>,
    pub content: String,
    pub score: f32,
}

/// Result of [`Retriever::retrieve`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalOutcome {
    pub found: bool,
    pub entries: Vec<RetrievedEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Best score among the returned entries, `0.0` when none.
    pub top_score: f32,
    /// Whether the HyDE stage ran.
    #[serde(skip)]
    pub used_hyde: bool,
}

impl RetrievalOutcome {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            found: false,
            entries: Vec::new(),
            message: Some(message.into()),
            top_score: 0.0,
            used_hyde: false,
        }
    }
}

/// Retrieval pipeline over a store, an index and two providers.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn KnowledgeStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn HypotheticalGenerator>,
    thresholds: RetrievalThresholds,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn HypotheticalGenerator>,
        thresholds: RetrievalThresholds,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            generator,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> RetrievalThresholds {
        self.thresholds
    }

    /// Retrieve the most relevant active entries for `query`.
    ///
    /// Never fails: an embedding, index or store failure in the direct stage
    /// comes back as a not-found outcome carrying [`RETRIEVAL_ERROR_MESSAGE`].
    pub async fn retrieve(&self, query: &str, category_id: Option<&str>) -> RetrievalOutcome {
        match self.try_retrieve(query, category_id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!("retrieval failed: {:#}", err);
                RetrievalOutcome::not_found(RETRIEVAL_ERROR_MESSAGE)
            }
        }
    }

    /// Like [`Retriever::retrieve`], but direct-stage and store failures are
    /// returned as errors. Any failure inside the HyDE stage only drops that
    /// stage and keeps the direct hits.
    pub async fn try_retrieve(&self, query: &str, category_id: Option<&str>) -> Result<RetrievalOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(RetrievalOutcome::not_found(NO_RESULTS_MESSAGE));
        }

        let t = self.thresholds;
        let filter = QueryFilter::active_in(category_id);

        let query_vec = self.embedder.embed(query).await?;
        let direct = self
            .index
            .query(&query_vec, t.top_k, &filter, t.direct_floor)
            .await?;
        let direct_top = direct.first().map(|h| h.score).unwrap_or(0.0);

        let mut used_hyde = false;
        let hits = if direct_top < t.hyde_trigger {
            used_hyde = true;
            match self.hyde_stage(query, &filter).await {
                Ok(hyde) => {
                    tracing::debug!(
                        direct = direct.len(),
                        hyde = hyde.len(),
                        direct_top,
                        "HyDE stage finished"
                    );
                    merge_hits(direct, hyde, t.top_k)
                }
                Err(err) => {
                    tracing::warn!("HyDE stage failed, keeping direct hits: {:#}", err);
                    direct
                }
            }
        } else {
            direct
        };

        if hits.is_empty() {
            let mut outcome = RetrievalOutcome::not_found(NO_RESULTS_MESSAGE);
            outcome.used_hyde = used_hyde;
            return Ok(outcome);
        }

        let ids: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();
        let rows = self.store.get_active_by_ids(&ids).await?;
        let mut by_id: HashMap<String, _> = rows.into_iter().map(|e| (e.id.clone(), e)).collect();

        let entries: Vec<RetrievedEntry> = hits
            .iter()
            .filter_map(|hit| {
                by_id.remove(&hit.id).map(|e| RetrievedEntry {
                    id: e.id,
                    title: e.title,
                    section: e.section,
                    content: e.content,
                    score: hit.score,
                })
            })
            .collect();

        if entries.is_empty() {
            let mut outcome = RetrievalOutcome::not_found(NO_RESULTS_MESSAGE);
            outcome.used_hyde = used_hyde;
            return Ok(outcome);
        }

        let top_score = entries[0].score;
        Ok(RetrievalOutcome {
            found: true,
            entries,
            message: None,
            top_score,
            used_hyde,
        })
    }

    async fn hyde_stage(&self, query: &str, filter: &QueryFilter) -> Result<Vec<RetrievalHit>> {
        let hypothetical = self.generator.generate_hypothetical(query).await?;
        let hyde_vec = self.embedder.embed(&hyde_text(&hypothetical, query)).await?;
        self.index
            .query(&hyde_vec, self.thresholds.top_k, filter, self.thresholds.hyde_floor)
            .await
    }
}

/// Text embedded for the HyDE stage.
pub fn hyde_text(hypothetical: &str, query: &str) -> String {
    let hypothetical = hypothetical.trim();
    if hypothetical.is_empty() {
        query.to_string()
    } else {
        format!("{}\n\n{}", hypothetical, query)
    }
}

/// Merge two hit lists: highest score per id, sorted descending, at most `top_k`.
pub fn merge_hits(a: Vec<RetrievalHit>, b: Vec<RetrievalHit>, top_k: usize) -> Vec<RetrievalHit> {
    let mut best: HashMap<String, f32> = HashMap::new();
    for hit in a.into_iter().chain(b) {
        let slot = best.entry(hit.id).or_insert(f32::MIN);
        if hit.score > *slot {
            *slot = hit.score;
        }
    }
    let mut merged: Vec<RetrievalHit> = best
        .into_iter()
        .map(|(id, score)| RetrievalHit { id, score })
        .collect();
    merged.sort_by(|x, y| {
        y.score
            .partial_cmp(&x.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| x.id.cmp(&y.id))
    });
    merged.truncate(top_k);
    merged
}

/// Best retrieval score seen during one agent turn.
///
/// Starts at `0.0` and only ever grows.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TurnConfidence(f32);

impl TurnConfidence {
    pub fn new() -> Self {
        Self(0.0)
    }

    pub fn observe(&mut self, score: f32) {
        if score > self.0 {
            self.0 = score;
        }
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}
