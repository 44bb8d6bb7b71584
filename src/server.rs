//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/chat` | Run one agent turn and trace it |
//! | `POST` | `/retrieve` | Two-stage knowledge retrieval |
//! | `GET`  | `/kb` | List entries (`categoryId`, `source`, `active` filters) |
//! | `POST` | `/kb` | Create an entry |
//! | `PUT`  | `/kb/{id}` | Replace an entry's content |
//! | `DELETE` | `/kb/{id}` | Delete an entry and its vector |
//! | `POST` | `/kb/{id}/active` | Toggle an entry |
//! | `POST` | `/kb/import` | Bulk import |
//! | `POST` | `/kb/sync/{source}` | Replace every entry of one source |
//! | `POST` | `/feedback` | Thumbs up/down on the latest answer |
//! | `GET`  | `/queries` | Recent traced queries (`limit`) |
//! | `POST` | `/queries/{id}/resolve` | Answer a query by hand |
//! | `GET`  | `/tools/list` | Tool catalogue with schemas |
//! | `POST` | `/tools/{name}` | Call one tool directly |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "messages required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `timeout` (408),
//! `conflict` (409), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};

use concierge_harness_core::error::KnowledgeError;
use concierge_harness_core::ingest::ImportOutcome;
use concierge_harness_core::models::{KnowledgeEntry, NewEntry};
use concierge_harness_core::retrieval::RetrievalOutcome;
use concierge_harness_core::store::EntryFilter;

use crate::agent::TurnOutcome;
use crate::app::App;
use crate::llm::{ChatMessage, Role, ToolSpec};
use crate::tools::{tool_specs, ToolError, TurnContext};
use crate::trace::{Feedback, QueryTrace, TraceError};

/// Build the router over an assembled [`App`].
pub fn router(app: App) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/retrieve", post(handle_retrieve))
        .route("/kb", get(handle_list_entries).post(handle_create_entry))
        .route("/kb/import", post(handle_import))
        .route("/kb/sync/{source}", post(handle_sync_source))
        .route("/kb/{id}", put(handle_update_entry).delete(handle_delete_entry))
        .route("/kb/{id}/active", post(handle_set_active))
        .route("/feedback", post(handle_feedback))
        .route("/queries", get(handle_recent_queries))
        .route("/queries/{id}/resolve", post(handle_resolve_query))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .layer(cors)
        .with_state(app)
}

/// Bind `[server].bind` and serve until the process is terminated.
pub async fn run_server(app: App) -> anyhow::Result<()> {
    let bind_addr = app.config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("Concierge server listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, "server started");
    axum::serve(listener, router(app)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn error(status: StatusCode, code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code,
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!("request failed: {:#}", err);
    error(StatusCode::INTERNAL_SERVER_ERROR, "internal", format!("{:#}", err))
}

impl From<KnowledgeError> for AppError {
    fn from(err: KnowledgeError) -> Self {
        match err {
            KnowledgeError::InvalidEntry { .. } => bad_request(err.to_string()),
            KnowledgeError::NotFound(_) => error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
            KnowledgeError::Dependency(e) => internal(e),
        }
    }
}

impl From<TraceError> for AppError {
    fn from(err: TraceError) -> Self {
        match err {
            TraceError::NoMatchingResolution => error(StatusCode::CONFLICT, "conflict", err.to_string()),
            TraceError::QueryNotFound(_) => error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
            TraceError::EmptyResponse => bad_request(err.to_string()),
            TraceError::Storage(e) => internal(e),
        }
    }
}

impl From<ToolError> for AppError {
    fn from(err: ToolError) -> Self {
        let (status, code) = match err {
            ToolError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            ToolError::UnknownTool(_) => (StatusCode::NOT_FOUND, "not_found"),
            ToolError::Timeout { .. } => (StatusCode::REQUEST_TIMEOUT, "timeout"),
        };
        error(status, code, err.to_string())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    messages: Vec<IncomingMessage>,
    #[serde(default)]
    category_id: Option<String>,
    #[serde(default)]
    actor_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    role: Role,
    #[serde(default)]
    content: String,
}

async fn handle_chat(
    State(app): State<App>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<TurnOutcome>, AppError> {
    let history: Vec<ChatMessage> = req
        .messages
        .into_iter()
        .filter_map(|m| match m.role {
            Role::User => Some(ChatMessage::user(m.content)),
            Role::Assistant => Some(ChatMessage::assistant(m.content)),
            Role::System | Role::Tool => None,
        })
        .collect();
    if history.is_empty() {
        return Err(bad_request("messages required"));
    }

    let turn = TurnContext {
        category_id: req.category_id,
        actor_id: req.actor_id,
    };
    let outcome = app.ask(&history, &turn).await.map_err(internal)?;
    Ok(Json(outcome))
}

// ============ POST /retrieve ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveRequest {
    query: String,
    #[serde(default)]
    category_id: Option<String>,
}

async fn handle_retrieve(
    State(app): State<App>,
    Json(req): Json<RetrieveRequest>,
) -> Result<Json<RetrievalOutcome>, AppError> {
    let outcome = app
        .retriever
        .retrieve(&req.query, req.category_id.as_deref())
        .await;
    Ok(Json(outcome))
}

// ============ /kb ============

#[derive(Serialize)]
struct EntryListResponse {
    entries: Vec<KnowledgeEntry>,
}

async fn handle_list_entries(
    State(app): State<App>,
    Query(filter): Query<EntryFilter>,
) -> Result<Json<EntryListResponse>, AppError> {
    let entries = app.kb.list(&filter).await?;
    Ok(Json(EntryListResponse { entries }))
}

async fn handle_create_entry(
    State(app): State<App>,
    Json(new): Json<NewEntry>,
) -> Result<(StatusCode, Json<KnowledgeEntry>), AppError> {
    let entry = app.kb.create(new).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn handle_update_entry(
    State(app): State<App>,
    Path(id): Path<String>,
    Json(changes): Json<NewEntry>,
) -> Result<Json<KnowledgeEntry>, AppError> {
    Ok(Json(app.kb.update(&id, changes).await?))
}

async fn handle_delete_entry(
    State(app): State<App>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    app.kb.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ActiveRequest {
    active: bool,
}

async fn handle_set_active(
    State(app): State<App>,
    Path(id): Path<String>,
    Json(req): Json<ActiveRequest>,
) -> Result<Json<KnowledgeEntry>, AppError> {
    Ok(Json(app.kb.set_active(&id, req.active).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportRequest {
    entries: Vec<NewEntry>,
    #[serde(default = "default_skip_duplicates")]
    skip_duplicates: bool,
}

fn default_skip_duplicates() -> bool {
    true
}

async fn handle_import(
    State(app): State<App>,
    Json(req): Json<ImportRequest>,
) -> Result<Json<ImportOutcome>, AppError> {
    Ok(Json(app.kb.bulk_import(&req.entries, req.skip_duplicates).await?))
}

#[derive(Debug, Deserialize)]
struct SyncRequest {
    entries: Vec<NewEntry>,
}

async fn handle_sync_source(
    State(app): State<App>,
    Path(source): Path<String>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<ImportOutcome>, AppError> {
    Ok(Json(app.kb.sync_by_source(&source, req.entries).await?))
}

// ============ POST /feedback ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackRequest {
    query: String,
    #[serde(default)]
    actor_id: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    value: Feedback,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolutionResponse {
    resolution_id: String,
}

async fn handle_feedback(
    State(app): State<App>,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<ResolutionResponse>, AppError> {
    let channel = req
        .channel
        .unwrap_or_else(|| app.trace.channel().to_string());
    let resolution_id = app
        .trace
        .submit_feedback(&req.query, req.actor_id.as_deref(), &channel, req.value)
        .await?;
    Ok(Json(ResolutionResponse { resolution_id }))
}

// ============ /queries ============

#[derive(Debug, Deserialize)]
struct RecentQueriesParams {
    #[serde(default = "default_recent_limit")]
    limit: usize,
}

fn default_recent_limit() -> usize {
    20
}

#[derive(Serialize)]
struct RecentQueriesResponse {
    queries: Vec<QueryTrace>,
}

async fn handle_recent_queries(
    State(app): State<App>,
    Query(params): Query<RecentQueriesParams>,
) -> Result<Json<RecentQueriesResponse>, AppError> {
    let queries = app.trace.recent(params.limit).await.map_err(internal)?;
    Ok(Json(RecentQueriesResponse { queries }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveRequest {
    response_text: String,
}

async fn handle_resolve_query(
    State(app): State<App>,
    Path(id): Path<String>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ResolutionResponse>, AppError> {
    let resolution_id = app.trace.resolve_manually(&id, &req.response_text).await?;
    Ok(Json(ResolutionResponse { resolution_id }))
}

// ============ /tools ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolSpec>,
}

async fn handle_list_tools() -> Json<ToolListResponse> {
    Json(ToolListResponse { tools: tool_specs() })
}

#[derive(Serialize)]
struct ToolCallResponse {
    result: Value,
    success: bool,
}

async fn handle_tool_call(
    State(app): State<App>,
    Path(name): Path<String>,
    Query(turn): Query<TurnContext>,
    Json(params): Json<Value>,
) -> Result<Json<ToolCallResponse>, AppError> {
    let timeout = app.agent.settings().tool_timeout;
    let outcome = tokio::time::timeout(timeout, app.tools.call(&name, &params, &turn))
        .await
        .map_err(|_| {
            AppError::from(ToolError::Timeout {
                tool: name.clone(),
                secs: timeout.as_secs(),
            })
        })??;
    Ok(Json(ToolCallResponse {
        result: outcome.output.to_json(),
        success: outcome.success,
    }))
}
