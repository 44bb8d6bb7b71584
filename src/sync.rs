//! Knowledge sources and the sync orchestrator.
//!
//! A [`KnowledgeSource`] yields the complete, already anonymized set of
//! entries it owns. [`run_sync`] replaces each source's slice of the
//! knowledge base through [`KnowledgeBase::sync_by_source`], one phase per
//! source, and collects a [`SyncReport`]. A failing source is recorded in
//! its phase and the run moves on.
//!
//! # Filesystem sources
//!
//! `[sources.<name>]` points at a directory. Files matching `include_globs`
//! (default `**/*.json`) and not matching `exclude_globs` are read in path
//! order. Each holds a JSON array of entries:
//!
//! ```json
//! [
//!   { "title": "Terraza", "content": "Terraza climatizada con 40 plazas.",
//!     "section": "Espacios", "categoryId": "espacios" }
//! ]
//! ```
//!
//! `.git`, `target` and `node_modules` are always excluded.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

use concierge_harness_core::ingest::KnowledgeBase;
use concierge_harness_core::models::{NewEntry, SyncPhaseResult, SyncReport};

use crate::config::{Config, SourceConfig};

#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Source tag written on every entry this source produces.
    fn name(&self) -> &str;

    /// Every entry the source currently holds.
    async fn load(&self) -> Result<Vec<NewEntry>>;
}

pub struct FilesystemJsonSource {
    name: String,
    config: SourceConfig,
}

impl FilesystemJsonSource {
    pub fn new(name: impl Into<String>, config: SourceConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// Matching files, relative-path sorted.
    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        let root = &self.config.root;
        if !root.exists() {
            bail!("Source '{}' root does not exist: {}", self.name, root.display());
        }

        let include_set = build_globset(&self.config.include_globs)?;
        let mut excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        excludes.extend(self.config.exclude_globs.clone());
        let exclude_set = build_globset(&excludes)?;

        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(self.config.follow_symlinks) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");
            if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
                continue;
            }
            files.push((rel_str, path.to_path_buf()));
        }

        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files.into_iter().map(|(_, p)| p).collect())
    }

    fn read_file(&self, path: &Path) -> Result<Vec<NewEntry>> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut entries: Vec<NewEntry> = serde_json::from_str(&text)
            .with_context(|| format!("{} is not a JSON array of entries", path.display()))?;
        for entry in &mut entries {
            if entry.category_id.is_none() {
                entry.category_id = self.config.category_id.clone();
            }
            if entry.language.is_none() {
                entry.language = self.config.language.clone();
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl KnowledgeSource for FilesystemJsonSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Vec<NewEntry>> {
        let mut entries = Vec::new();
        for path in self.scan()? {
            entries.extend(self.read_file(&path)?);
        }
        Ok(entries)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Sources configured under `[sources.*]`, optionally narrowed to one name.
pub fn configured_sources(config: &Config, only: Option<&str>) -> Result<Vec<Box<dyn KnowledgeSource>>> {
    if let Some(name) = only {
        if !config.sources.contains_key(name) {
            bail!("Unknown source: {}", name);
        }
    }
    Ok(config
        .sources
        .iter()
        .filter(|(name, _)| only.map_or(true, |o| o == name.as_str()))
        .map(|(name, cfg)| Box::new(FilesystemJsonSource::new(name.clone(), cfg.clone())) as Box<dyn KnowledgeSource>)
        .collect())
}

/// Resync every source in order.
pub async fn run_sync(kb: &KnowledgeBase, sources: &[Box<dyn KnowledgeSource>]) -> SyncReport {
    let started = Instant::now();
    let mut report = SyncReport::default();

    for source in sources {
        let phase_started = Instant::now();
        let mut phase = SyncPhaseResult {
            phase: format!("kb:{}", source.name()),
            source: source.name().to_string(),
            ..Default::default()
        };

        match source.load().await {
            Ok(entries) => {
                tracing::info!(source = source.name(), entries = entries.len(), "syncing source");
                match kb.sync_by_source(source.name(), entries).await {
                    Ok(outcome) => {
                        phase.created = outcome.created;
                        phase.skipped = outcome.skipped;
                        phase.errors.extend(outcome.warnings);
                    }
                    Err(e) => phase.errors.push(e.to_string()),
                }
            }
            Err(e) => phase.errors.push(format!("{:#}", e)),
        }

        if !phase.errors.is_empty() {
            tracing::warn!(source = source.name(), errors = ?phase.errors, "source sync had errors");
        }
        phase.duration_ms = phase_started.elapsed().as_millis() as u64;
        report.push_phase(phase);
    }

    report.duration_ms = started.elapsed().as_millis() as u64;
    report
}
