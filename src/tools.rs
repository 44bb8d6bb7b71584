//! The assistant's closed tool catalogue.
//!
//! Four read-only tools are advertised to the chat model:
//!
//! | Tool | Input | Reads |
//! |------|-------|-------|
//! | `searchKnowledgeBase` | `query`, `categoryFilter?` | [`Retriever`] |
//! | `lookupReservation` | `guestName?`, `date?` | `reservations` |
//! | `getActiveIncidents` | none | `incidents`, `weather_alerts` |
//! | `checkWaitingList` | `date` | `waiting_list` |
//!
//! Every tool has a typed input struct (unknown fields rejected) and a typed
//! output struct. Dispatch is a `match` on [`AssistantTool`].
//!
//! # Failure Semantics
//!
//! - Malformed input or an unknown tool name → [`ToolError`], which the agent
//!   hands back to the model as the tool result.
//! - A failing data dependency inside a tool → the tool's empty output shape
//!   with a Spanish error message, and `success = false` on the outcome.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use thiserror::Error;

use concierge_harness_core::retrieval::{RetrievalOutcome, Retriever};

use crate::llm::ToolSpec;
use crate::operations::{self, Incident, Reservation, WaitingListEntry, WeatherAlert};

pub const SEARCH_ERROR_MESSAGE: &str = "Error al buscar información.";
pub const NO_RESERVATIONS_MESSAGE: &str = "No se encontraron reservas con esos datos.";
pub const RESERVATION_ERROR_MESSAGE: &str = "Error al buscar reservas.";
pub const INCIDENTS_ERROR_MESSAGE: &str = "Error al consultar incidencias.";
pub const WAITING_LIST_ERROR_MESSAGE: &str = "Error al consultar la lista de espera.";

const MAX_RESERVATIONS: usize = 5;
const MAX_INCIDENTS: usize = 5;
const MAX_WEATHER_ALERTS: usize = 5;
const MAX_WAITING_SHOWN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("invalid input for {tool}: {reason}")]
    InvalidInput { tool: &'static str, reason: String },
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("tool {tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },
}

impl ToolError {
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::InvalidInput { .. } => "invalid_input",
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::Timeout { .. } => "timeout",
        }
    }

    /// The payload handed back to the model in place of a tool result.
    pub fn to_json(&self) -> Value {
        json!({ "error": { "code": self.code(), "message": self.to_string() } })
    }
}

fn invalid(tool: AssistantTool, reason: impl Into<String>) -> ToolError {
    ToolError::InvalidInput {
        tool: tool.name(),
        reason: reason.into(),
    }
}

// ============ Catalogue ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantTool {
    SearchKnowledgeBase,
    LookupReservation,
    GetActiveIncidents,
    CheckWaitingList,
}

impl AssistantTool {
    pub const ALL: [AssistantTool; 4] = [
        AssistantTool::SearchKnowledgeBase,
        AssistantTool::LookupReservation,
        AssistantTool::GetActiveIncidents,
        AssistantTool::CheckWaitingList,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AssistantTool::SearchKnowledgeBase => "searchKnowledgeBase",
            AssistantTool::LookupReservation => "lookupReservation",
            AssistantTool::GetActiveIncidents => "getActiveIncidents",
            AssistantTool::CheckWaitingList => "checkWaitingList",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            AssistantTool::SearchKnowledgeBase => {
                "Busca información verificada en la base de conocimiento del restaurante. \
                 Úsala para responder preguntas sobre espacios, menús, alérgenos, horarios, \
                 accesibilidad y cualquier servicio del restaurante."
            }
            AssistantTool::LookupReservation => {
                "Busca reservas existentes por nombre del cliente o por fecha. \
                 Úsala cuando el agente pregunte por una reserva concreta o quiera verificarla."
            }
            AssistantTool::GetActiveIncidents => {
                "Obtiene las incidencias activas y alertas meteorológicas del restaurante. \
                 Úsala cuando el agente pregunte por problemas actuales, cierres o incidencias operativas."
            }
            AssistantTool::CheckWaitingList => {
                "Comprueba la lista de espera para una fecha concreta. \
                 Úsala cuando el agente pregunte cuántas personas esperan mesa o quiera apuntar a alguien."
            }
        }
    }

    /// JSON Schema of the tool's input, in OpenAI function-calling form.
    pub fn parameters_schema(&self) -> Value {
        match self {
            AssistantTool::SearchKnowledgeBase => json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "La consulta o pregunta del cliente en lenguaje natural"
                    },
                    "categoryFilter": {
                        "type": "string",
                        "description": "ID de categoría para filtrar resultados (opcional)"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
            AssistantTool::LookupReservation => json!({
                "type": "object",
                "properties": {
                    "guestName": {
                        "type": "string",
                        "description": "Nombre del cliente (búsqueda parcial, no sensible a mayúsculas)"
                    },
                    "date": {
                        "type": "string",
                        "description": "Fecha en formato YYYY-MM-DD para buscar reservas de ese día"
                    }
                },
                "additionalProperties": false
            }),
            AssistantTool::GetActiveIncidents => json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
            AssistantTool::CheckWaitingList => json!({
                "type": "object",
                "properties": {
                    "date": {
                        "type": "string",
                        "description": "Fecha en formato YYYY-MM-DD"
                    }
                },
                "required": ["date"],
                "additionalProperties": false
            }),
        }
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Specs for every tool, in catalogue order.
pub fn tool_specs() -> Vec<ToolSpec> {
    AssistantTool::ALL.iter().map(AssistantTool::spec).collect()
}

// ============ Inputs ============

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchKnowledgeInput {
    pub query: String,
    #[serde(default)]
    pub category_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LookupReservationInput {
    #[serde(default)]
    pub guest_name: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetActiveIncidentsInput {}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckWaitingListInput {
    pub date: String,
}

/// Deserialize tool arguments. `null` counts as an empty object.
fn parse_input<T: DeserializeOwned>(tool: AssistantTool, arguments: &Value) -> Result<T, ToolError> {
    let args = match arguments {
        Value::Null => json!({}),
        Value::Object(_) => arguments.clone(),
        Value::String(raw) => {
            return Err(invalid(tool, format!("arguments are not a JSON object: {}", raw)))
        }
        other => {
            return Err(invalid(tool, format!("arguments must be a JSON object, got {}", other)))
        }
    };
    serde_json::from_value(args).map_err(|e| invalid(tool, e.to_string()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============ Outputs ============

pub type SearchKnowledgeOutput = RetrievalOutcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationView {
    pub guest_name: String,
    pub guest_phone: Option<String>,
    pub date: String,
    pub time: String,
    pub party_size: i64,
    pub status: operations::ReservationStatus,
    pub notes: Option<String>,
}

impl From<Reservation> for ReservationView {
    fn from(r: Reservation) -> Self {
        Self {
            guest_name: r.guest_name,
            guest_phone: r.guest_phone,
            date: r.date.to_string(),
            time: r.time,
            party_size: r.party_size,
            status: r.status,
            notes: r.notes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupReservationOutput {
    pub found: bool,
    pub message: Option<String>,
    pub reservations: Vec<ReservationView>,
}

impl LookupReservationOutput {
    fn empty(message: &str) -> Self {
        Self {
            found: false,
            message: Some(message.to_string()),
            reservations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentView {
    #[serde(rename = "type")]
    pub incident_type: String,
    pub description: String,
    pub severity: operations::Severity,
    pub status: operations::IncidentStatus,
}

impl From<Incident> for IncidentView {
    fn from(i: Incident) -> Self {
        Self {
            incident_type: i.incident_type,
            description: i.description,
            severity: i.severity,
            status: i.status,
        }
    }
}

/// A weather alert as shown to the agent. `triggeredAt` is RFC 3339.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherAlertView {
    pub alert_type: String,
    pub severity: operations::Severity,
    pub description: String,
    pub forecast_date: chrono::NaiveDate,
    pub precipitation_mm: Option<f64>,
    pub wind_speed_kmh: Option<f64>,
    pub temperature_c: Option<f64>,
    pub action: Option<String>,
    pub status: operations::AlertStatus,
    pub triggered_at: Option<String>,
}

impl From<WeatherAlert> for WeatherAlertView {
    fn from(w: WeatherAlert) -> Self {
        Self {
            alert_type: w.alert_type,
            severity: w.severity,
            description: w.description,
            forecast_date: w.forecast_date,
            precipitation_mm: w.precipitation_mm,
            wind_speed_kmh: w.wind_speed_kmh,
            temperature_c: w.temperature_c,
            action: w.action,
            status: w.status,
            triggered_at: w
                .triggered_at
                .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                .map(|dt| dt.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveIncidentsOutput {
    pub incidents: Vec<IncidentView>,
    pub weather_alerts: Vec<WeatherAlertView>,
    pub has_active_issues: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingPosition {
    pub position: usize,
    pub guest_name: String,
    pub party_size: i64,
    pub priority: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingListOutput {
    pub date: String,
    pub total_waiting: usize,
    pub entries: Vec<WaitingPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WaitingListOutput {
    /// Number the queue 1.. and keep the first eight.
    pub fn from_queue(date: String, queue: Vec<WaitingListEntry>) -> Self {
        let total_waiting = queue.len();
        let entries = queue
            .into_iter()
            .take(MAX_WAITING_SHOWN)
            .enumerate()
            .map(|(i, e)| WaitingPosition {
                position: i + 1,
                guest_name: e.guest_name,
                party_size: e.party_size,
                priority: e.priority,
                notes: e.notes,
            })
            .collect();
        Self {
            date,
            total_waiting,
            entries,
            message: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Search(SearchKnowledgeOutput),
    Reservations(LookupReservationOutput),
    Incidents(ActiveIncidentsOutput),
    WaitingList(WaitingListOutput),
}

impl ToolOutput {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| json!({ "error": e.to_string() }))
    }

    /// Retrieval score to fold into the turn's confidence, for searches.
    pub fn top_score(&self) -> Option<f32> {
        match self {
            ToolOutput::Search(outcome) => Some(outcome.top_score),
            _ => None,
        }
    }
}

/// Result of one successful dispatch. `success` is false when a data
/// dependency failed and the output is the degraded empty shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub output: ToolOutput,
    pub success: bool,
}

/// One executed tool call as recorded in a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub name: String,
    pub input: Value,
    pub output: Value,
    pub success: bool,
}

/// Request-level context shared by every tool call in a turn.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnContext {
    /// Default category for knowledge searches that do not name one.
    pub category_id: Option<String>,
    /// Identifier of the staff member driving the conversation.
    pub actor_id: Option<String>,
}

// ============ Execution ============

/// Everything the tools read from.
#[derive(Clone)]
pub struct ToolContext {
    pool: SqlitePool,
    retriever: Retriever,
}

impl ToolContext {
    pub fn new(pool: SqlitePool, retriever: Retriever) -> Self {
        Self { pool, retriever }
    }

    /// Resolve `name` and run the tool.
    pub async fn call(
        &self,
        name: &str,
        arguments: &Value,
        turn: &TurnContext,
    ) -> Result<ToolOutcome, ToolError> {
        let tool =
            AssistantTool::from_name(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        self.execute(tool, arguments, turn).await
    }

    pub async fn execute(
        &self,
        tool: AssistantTool,
        arguments: &Value,
        turn: &TurnContext,
    ) -> Result<ToolOutcome, ToolError> {
        match tool {
            AssistantTool::SearchKnowledgeBase => {
                let input: SearchKnowledgeInput = parse_input(tool, arguments)?;
                if input.query.trim().is_empty() {
                    return Err(invalid(tool, "query must not be empty"));
                }
                let category = non_blank(input.category_filter.clone()).or_else(|| turn.category_id.clone());
                Ok(degrade(
                    tool,
                    self.search_knowledge_base(&input.query, category.as_deref()).await,
                    || ToolOutput::Search(RetrievalOutcome::not_found(SEARCH_ERROR_MESSAGE)),
                    ToolOutput::Search,
                ))
            }
            AssistantTool::LookupReservation => {
                let input: LookupReservationInput = parse_input(tool, arguments)?;
                let guest_name = non_blank(input.guest_name);
                let date = match non_blank(input.date) {
                    Some(d) => Some(operations::parse_date(&d).map_err(|e| invalid(tool, e.to_string()))?),
                    None => None,
                };
                if guest_name.is_none() && date.is_none() {
                    return Err(invalid(tool, "provide guestName, date, or both"));
                }
                Ok(degrade(
                    tool,
                    self.lookup_reservation(guest_name.as_deref(), date).await,
                    || ToolOutput::Reservations(LookupReservationOutput::empty(RESERVATION_ERROR_MESSAGE)),
                    ToolOutput::Reservations,
                ))
            }
            AssistantTool::GetActiveIncidents => {
                let _: GetActiveIncidentsInput = parse_input(tool, arguments)?;
                Ok(degrade(
                    tool,
                    self.get_active_incidents().await,
                    || {
                        ToolOutput::Incidents(ActiveIncidentsOutput {
                            incidents: Vec::new(),
                            weather_alerts: Vec::new(),
                            has_active_issues: false,
                            message: Some(INCIDENTS_ERROR_MESSAGE.to_string()),
                        })
                    },
                    ToolOutput::Incidents,
                ))
            }
            AssistantTool::CheckWaitingList => {
                let input: CheckWaitingListInput = parse_input(tool, arguments)?;
                let date = operations::parse_date(&input.date).map_err(|e| invalid(tool, e.to_string()))?;
                let label = date.to_string();
                Ok(degrade(
                    tool,
                    self.check_waiting_list(date).await,
                    || {
                        ToolOutput::WaitingList(WaitingListOutput {
                            date: label.clone(),
                            total_waiting: 0,
                            entries: Vec::new(),
                            message: Some(WAITING_LIST_ERROR_MESSAGE.to_string()),
                        })
                    },
                    ToolOutput::WaitingList,
                ))
            }
        }
    }

    /// Knowledge search through the two-stage retriever.
    pub async fn search_knowledge_base(
        &self,
        query: &str,
        category_id: Option<&str>,
    ) -> Result<SearchKnowledgeOutput> {
        self.retriever.try_retrieve(query, category_id).await
    }

    pub async fn lookup_reservation(
        &self,
        guest_name: Option<&str>,
        date: Option<chrono::NaiveDate>,
    ) -> Result<LookupReservationOutput> {
        let found = operations::find_reservations(&self.pool, guest_name, date, MAX_RESERVATIONS).await?;
        if found.is_empty() {
            return Ok(LookupReservationOutput::empty(NO_RESERVATIONS_MESSAGE));
        }
        Ok(LookupReservationOutput {
            found: true,
            message: None,
            reservations: found.into_iter().map(ReservationView::from).collect(),
        })
    }

    pub async fn get_active_incidents(&self) -> Result<ActiveIncidentsOutput> {
        let incidents = operations::active_incidents(&self.pool, MAX_INCIDENTS).await?;
        let weather_alerts = operations::active_weather_alerts(&self.pool, MAX_WEATHER_ALERTS).await?;
        let has_active_issues = !incidents.is_empty() || !weather_alerts.is_empty();
        Ok(ActiveIncidentsOutput {
            incidents: incidents.into_iter().map(IncidentView::from).collect(),
            weather_alerts: weather_alerts.into_iter().map(WeatherAlertView::from).collect(),
            has_active_issues,
            message: None,
        })
    }

    pub async fn check_waiting_list(&self, date: chrono::NaiveDate) -> Result<WaitingListOutput> {
        let queue = operations::waiting_list_for(&self.pool, date).await?;
        Ok(WaitingListOutput::from_queue(date.to_string(), queue))
    }
}

fn degrade<T>(
    tool: AssistantTool,
    result: Result<T>,
    fallback: impl FnOnce() -> ToolOutput,
    wrap: impl FnOnce(T) -> ToolOutput,
) -> ToolOutcome {
    match result {
        Ok(value) => ToolOutcome {
            output: wrap(value),
            success: true,
        },
        Err(err) => {
            tracing::warn!(tool = tool.name(), "tool data access failed: {:#}", err);
            ToolOutcome {
                output: fallback(),
                success: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn names_round_trip() {
        for tool in AssistantTool::ALL {
            assert_eq!(AssistantTool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(AssistantTool::from_name("deleteReservation"), None);
        assert_eq!(tool_specs().len(), 4);
    }

    #[test]
    fn inputs_reject_unknown_fields_and_bad_shapes() {
        let tool = AssistantTool::SearchKnowledgeBase;
        let ok: SearchKnowledgeInput = parse_input(tool, &json!({"query": "terraza"})).unwrap();
        assert_eq!(ok.category_filter, None);

        let err = parse_input::<SearchKnowledgeInput>(tool, &json!({"query": "x", "limit": 3})).unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        assert!(parse_input::<SearchKnowledgeInput>(tool, &json!({})).is_err());
        assert!(parse_input::<SearchKnowledgeInput>(tool, &json!("{not json")).is_err());
        assert!(parse_input::<SearchKnowledgeInput>(tool, &json!([1, 2])).is_err());

        let none: GetActiveIncidentsInput =
            parse_input(AssistantTool::GetActiveIncidents, &Value::Null).unwrap();
        assert_eq!(none, GetActiveIncidentsInput {});
        assert!(parse_input::<GetActiveIncidentsInput>(
            AssistantTool::GetActiveIncidents,
            &json!({"": ""})
        )
        .is_err());
    }

    #[test]
    fn waiting_list_positions_and_truncation() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 17).unwrap();
        let queue: Vec<WaitingListEntry> = (0..11)
            .map(|i| WaitingListEntry {
                id: format!("w{}", i),
                guest_name: format!("Cliente {}", i),
                party_size: 2,
                requested_date: date,
                priority: 0,
                notes: None,
                notified: false,
                created_at: i,
            })
            .collect();
        let out = WaitingListOutput::from_queue(date.to_string(), queue);
        assert_eq!(out.total_waiting, 11);
        assert_eq!(out.entries.len(), 8);
        let positions: Vec<usize> = out.entries.iter().map(|e| e.position).collect();
        assert_eq!(positions, (1..=8).collect::<Vec<_>>());
        assert_eq!(out.entries[0].guest_name, "Cliente 0");
    }

    #[test]
    fn tool_errors_serialize_for_the_model() {
        let err = ToolError::UnknownTool("cancelReservation".into());
        let v = err.to_json();
        assert_eq!(v["error"]["code"], "unknown_tool");
        assert!(v["error"]["message"].as_str().unwrap().contains("cancelReservation"));
    }
}
