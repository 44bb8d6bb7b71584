//! # Concierge Harness
//!
//! Knowledge retrieval and tool orchestration for a restaurant
//! customer-service assistant.
//!
//! Staff questions go to a bounded agent loop that can search a
//! deduplicated knowledge base (direct vector search, escalating to HyDE
//! when the match is weak), look up reservations, check incidents and
//! weather alerts, and read the waiting list. Every turn is traced with its
//! retrieval confidence so answers can be audited and rated.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌────────────────┐
//! │ import, sync │──▶│ KnowledgeBase │──▶│ SQLite store + │
//! │ HTTP /kb     │   │ hash + embed  │   │ vector index   │
//! └──────────────┘   └───────────────┘   └───────┬────────┘
//!                                                │
//! ┌──────────────┐   ┌───────────────┐   ┌───────▼────────┐
//! │ Agent loop   │──▶│ Tools         │──▶│ Retriever      │
//! │ (max steps)  │   │ (typed, 4)    │   │ direct + HyDE  │
//! └──────┬───────┘   └───────────────┘   └────────────────┘
//!        ▼
//! ┌──────────────┐
//! │ Trace        │
//! └──────────────┘
//! ```
//!
//! The storage-independent pipeline (models, hashing, ingestion, retrieval,
//! in-memory backends) lives in `concierge-harness-core`; this crate adds
//! SQLite, HTTP providers, the agent, the server and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] / [`migrate`] | SQLite pool and schema |
//! | [`sqlite_store`] / [`sqlite_index`] | SQLite knowledge store and vector index |
//! | [`pinecone`] | Pinecone REST vector index |
//! | [`http`] | Shared JSON POST with retry |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Chat models and the HyDE generator |
//! | [`operations`] | Reservations, incidents, weather, waiting list |
//! | [`tools`] | The assistant's tool catalogue |
//! | [`agent`] | Bounded multi-step agent loop |
//! | [`trace`] | Turn tracing and feedback |
//! | [`sync`] | Knowledge sources and sync runs |
//! | [`app`] | Component wiring |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI command implementations |

pub mod agent;
pub mod app;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod http;
pub mod llm;
pub mod migrate;
pub mod operations;
pub mod pinecone;
pub mod server;
pub mod sqlite_index;
pub mod sqlite_store;
pub mod sync;
pub mod tools;
pub mod trace;
