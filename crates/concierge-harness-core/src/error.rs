//! Typed errors for knowledge-base operations.

use thiserror::Error;

/// Result alias for knowledge-base operations.
pub type KnowledgeResult<T> = std::result::Result<T, KnowledgeError>;

/// Errors returned by the ingestion pipeline and edit paths.
///
/// Validation and not-found cases are distinct variants so callers can tell
/// them apart from dependency failures without string matching.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// An input entry is missing a required field.
    #[error("invalid entry at position {index}: {reason}")]
    InvalidEntry { index: usize, reason: String },

    /// No entry exists with this id.
    #[error("knowledge entry not found: {0}")]
    NotFound(String),

    /// Store, index or provider failure.
    #[error(transparent)]
    Dependency(#[from] anyhow::Error),
}
