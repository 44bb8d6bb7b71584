//! # Concierge Harness Core
//!
//! Runtime-agnostic logic for the concierge knowledge pipeline: data
//! models, content hashing, the store / vector index / embedding traits,
//! in-memory backends, the ingestion pipeline and two-stage retrieval.
//!
//! This crate contains no tokio, sqlx, HTTP clients or filesystem I/O.
//! Concrete backends live in the `concierge-harness` app crate.

pub mod content;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod models;
pub mod retrieval;
pub mod store;
