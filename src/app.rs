//! Component wiring.
//!
//! [`App`] owns one SQLite pool and every service built on it. The binary
//! and the HTTP server build it with [`App::open`]; tests inject stub
//! providers through [`App::assemble`].

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use std::sync::Arc;

use concierge_harness_core::embedding::{Embedder, HypotheticalGenerator};
use concierge_harness_core::index::VectorIndex;
use concierge_harness_core::ingest::KnowledgeBase;
use concierge_harness_core::retrieval::Retriever;
use concierge_harness_core::store::KnowledgeStore;

use crate::agent::{last_user_message, Agent, AgentSettings, TurnOutcome};
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::llm::{create_chat_model, ChatMessage, ChatModel, HydeGenerator};
use crate::pinecone::PineconeIndex;
use crate::sqlite_index::SqliteVectorIndex;
use crate::sqlite_store::SqliteKnowledgeStore;
use crate::tools::{ToolContext, TurnContext};
use crate::trace::TraceRecorder;
use crate::{db, migrate};

/// Build the configured vector index backend.
pub fn create_vector_index(config: &Config, pool: &SqlitePool) -> Result<Arc<dyn VectorIndex>> {
    match config.vector_index.backend.as_str() {
        "sqlite" => Ok(Arc::new(SqliteVectorIndex::new(pool.clone()))),
        "pinecone" => Ok(Arc::new(PineconeIndex::new(&config.vector_index)?)),
        other => bail!("Unknown vector index backend: {}", other),
    }
}

#[derive(Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub kb: Arc<KnowledgeBase>,
    pub retriever: Retriever,
    pub tools: ToolContext,
    pub agent: Arc<Agent>,
    pub trace: TraceRecorder,
}

impl App {
    /// Connect, migrate and build every provider from `config`.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;
        let embedder = create_embedder(&config.embedding)?;
        let chat = create_chat_model(&config.generation)?;
        let index = create_vector_index(config, &pool)?;
        Ok(Self::assemble(config, pool, embedder, chat, index))
    }

    /// Wire services over an open pool and explicit providers.
    pub fn assemble(
        config: &Config,
        pool: SqlitePool,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        let store: Arc<dyn KnowledgeStore> = Arc::new(SqliteKnowledgeStore::new(pool.clone()));
        let generator: Arc<dyn HypotheticalGenerator> =
            Arc::new(HydeGenerator::new(chat.clone(), &config.generation));

        let kb = Arc::new(KnowledgeBase::new(store.clone(), index.clone(), embedder.clone()));
        let retriever = Retriever::new(
            store,
            index,
            embedder,
            generator,
            config.retrieval.thresholds(),
        );
        let tools = ToolContext::new(pool.clone(), retriever.clone());
        let agent = Arc::new(Agent::new(
            chat,
            tools.clone(),
            AgentSettings::from_config(&config.agent, &config.generation),
        ));
        let trace = TraceRecorder::new(pool.clone(), &config.trace);

        Self {
            config: Arc::new(config.clone()),
            pool,
            kb,
            retriever,
            tools,
            agent,
            trace,
        }
    }

    /// Run one agent turn and trace it.
    pub async fn ask(&self, history: &[ChatMessage], turn: &TurnContext) -> Result<TurnOutcome> {
        let outcome = self.agent.run_turn(history, turn).await?;
        let user_query = last_user_message(history).unwrap_or_default();
        self.trace
            .on_turn_finish(
                &outcome.answer,
                user_query,
                outcome.top_score,
                turn.actor_id.as_deref(),
            )
            .await;
        Ok(outcome)
    }
}
