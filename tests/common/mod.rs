//! Shared fixtures: a keyword embedder, a scripted chat model and a SQLite
//! backed [`App`] in a temp directory.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use concierge_harness::app::App;
use concierge_harness::config::{parse_config, Config};
use concierge_harness::llm::{
    ChatMessage, ChatModel, ChatResponse, CompletionOptions, ToolCall, ToolSpec, DEFAULT_HYDE_PROMPT,
};
use concierge_harness::operations::{self, QueryCategory};
use concierge_harness::sqlite_index::SqliteVectorIndex;
use concierge_harness::{db, migrate};
use concierge_harness_core::embedding::Embedder;
use concierge_harness_core::models::NewEntry;

/// Concept groups; a text's vector counts the keywords of each group it contains.
const CONCEPTS: &[&[&str]] = &[
    &["terraza"],
    &["gluten", "celíac", "alérgen"],
    &["horario", "abrimos", "cerramos"],
    &["aparcamiento", "parking"],
    &["infantil", "niños"],
];

/// Deterministic embedder: texts sharing a single concept score 1.0,
/// texts with no concept embed to the zero vector and match nothing.
/// Texts containing `lento` take three seconds.
pub struct KeywordEmbedder;

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    CONCEPTS
        .iter()
        .map(|keywords| keywords.iter().map(|k| lower.matches(k).count() as f32).sum())
        .collect()
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword"
    }
    fn dims(&self) -> usize {
        CONCEPTS.len()
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("lento")) {
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// Embeds texts by the first listed marker they contain; anything else is
/// the zero vector. Lets a test pin exact cosine scores.
pub struct TableEmbedder {
    table: Vec<(&'static str, Vec<f32>)>,
    dims: usize,
}

impl TableEmbedder {
    pub fn new(table: Vec<(&'static str, Vec<f32>)>) -> Self {
        let dims = table.first().map(|(_, v)| v.len()).unwrap_or(1);
        Self { table, dims }
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    fn model_name(&self) -> &str {
        "table"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                self.table
                    .iter()
                    .find(|(marker, _)| t.contains(marker))
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| vec![0.0; self.dims])
            })
            .collect())
    }
}

/// One recorded model call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<ChatMessage>,
    pub tool_count: usize,
}

/// Answers HyDE prompts with a fixed hypothetical and agent steps from a
/// script. An exhausted script answers `"Sin más información."`; with
/// `repeat_last` set the last scripted reply is returned forever.
pub struct ScriptedChat {
    hyde_reply: String,
    script: Mutex<VecDeque<ChatResponse>>,
    repeat_last: Option<ChatResponse>,
    calls: Mutex<Vec<RecordedCall>>,
    hyde_calls: AtomicUsize,
}

impl ScriptedChat {
    pub fn new(hyde_reply: &str, script: Vec<ChatResponse>) -> Self {
        Self {
            hyde_reply: hyde_reply.to_string(),
            script: Mutex::new(script.into()),
            repeat_last: None,
            calls: Mutex::new(Vec::new()),
            hyde_calls: AtomicUsize::new(0),
        }
    }

    pub fn looping(reply: ChatResponse) -> Self {
        Self {
            hyde_reply: String::new(),
            script: Mutex::new(VecDeque::new()),
            repeat_last: Some(reply),
            calls: Mutex::new(Vec::new()),
            hyde_calls: AtomicUsize::new(0),
        }
    }

    /// Agent calls only (HyDE calls are not recorded).
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of hypothetical-answer requests served so far.
    pub fn hyde_calls(&self) -> usize {
        self.hyde_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        _options: CompletionOptions,
    ) -> Result<ChatResponse> {
        if tools.is_empty() && messages.first().map(|m| m.content.as_str()) == Some(DEFAULT_HYDE_PROMPT) {
            self.hyde_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(ChatResponse::text(self.hyde_reply.clone()));
        }
        self.calls.lock().unwrap().push(RecordedCall {
            messages: messages.to_vec(),
            tool_count: tools.len(),
        });
        if let Some(ref reply) = self.repeat_last {
            return Ok(reply.clone());
        }
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ChatResponse::text("Sin más información.")))
    }
}

pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ChatResponse {
    ChatResponse {
        text: String::new(),
        tool_calls: vec![ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }],
    }
}

pub fn test_config(tmp: &TempDir, extra: &str) -> Config {
    let db_path = tmp.path().join("concierge.sqlite");
    let content = format!(
        r#"
[db]
path = "{}"

[server]
bind = "127.0.0.1:0"
{}
"#,
        db_path.display(),
        extra
    );
    parse_config(&content).unwrap()
}

pub struct TestEnv {
    pub tmp: TempDir,
    pub app: App,
    pub chat: Arc<ScriptedChat>,
    pub index: Arc<SqliteVectorIndex>,
}

pub async fn setup_with(chat: ScriptedChat, extra_config: &str) -> TestEnv {
    setup_with_embedder(chat, extra_config, Arc::new(KeywordEmbedder)).await
}

pub async fn setup_with_embedder(
    chat: ScriptedChat,
    extra_config: &str,
    embedder: Arc<dyn Embedder>,
) -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, extra_config);
    let pool = db::connect(&config).await.unwrap();
    migrate::migrate_pool(&pool).await.unwrap();

    let chat = Arc::new(chat);
    let index = Arc::new(SqliteVectorIndex::new(pool.clone()));
    let app = App::assemble(&config, pool, embedder, chat.clone(), index.clone());
    TestEnv {
        tmp,
        app,
        chat,
        index,
    }
}

pub async fn setup(chat: ScriptedChat) -> TestEnv {
    setup_with(chat, "").await
}

pub async fn add_default_category(app: &App) {
    operations::insert_category(
        &app.pool,
        &QueryCategory {
            id: "cat-general".into(),
            name: "General".into(),
            created_at: 1_700_000_000,
        },
    )
    .await
    .unwrap();
}

/// The restaurant knowledge used across scenarios.
pub fn restaurant_entries() -> Vec<NewEntry> {
    vec![
        NewEntry::new("Terraza", "Disponemos de una terraza climatizada con 40 plazas.")
            .with_section("Espacios")
            .with_category("espacios"),
        NewEntry::new("Opciones sin gluten", "Carta adaptada para celíacos con pan sin gluten.")
            .with_section("Alérgenos")
            .with_category("menus"),
        NewEntry::new("Horario", "Abrimos de 13:00 a 16:00 y de 20:00 a 23:30.")
            .with_category("general"),
        NewEntry::new("Aparcamiento", "Parking gratuito para clientes en el sótano.")
            .with_category("general"),
    ]
}

pub async fn seed_knowledge(app: &App) {
    let outcome = app.kb.bulk_import(&restaurant_entries(), true).await.unwrap();
    assert_eq!(outcome.created, 4);
}
