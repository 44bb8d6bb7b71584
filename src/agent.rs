//! Bounded multi-step agent loop over the tool catalogue.
//!
//! One turn:
//!
//! 1. Keep the last `history_window` conversation messages and prepend the
//!    system prompt.
//! 2. Call the chat model with every tool advertised. Tool calls run one
//!    after another, each under its own timeout, and their results are
//!    appended as `tool` messages.
//! 3. A reply without tool calls ends the turn with its text.
//! 4. The last allowed step is issued with tools disabled, so a turn makes
//!    at most `max_steps` model calls and always ends with an answer.
//!
//! Tool problems never abort the turn; the model sees a structured error
//! and can recover. A failing chat-model call does abort it.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use concierge_harness_core::retrieval::TurnConfidence;

use crate::config::{AgentConfig, GenerationConfig};
use crate::llm::{ChatMessage, ChatModel, CompletionOptions, Role, ToolCall};
use crate::tools::{tool_specs, ToolContext, ToolError, ToolInvocation, TurnContext};

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
Eres el asistente de Atención al Cliente (ATC) de Dreamland Restaurant.
Ayudas al equipo de sala a responder consultas de clientes de forma rápida y precisa.

CAPACIDADES:
- Buscar información verificada sobre espacios, menús, alérgenos, horarios y servicios
- Consultar reservas existentes por nombre de cliente o fecha
- Ver incidencias activas y alertas operativas del restaurante
- Comprobar la lista de espera para una fecha concreta

REGLAS ESTRICTAS:
1. Para info de espacios/menús/alérgenos/horarios → usa SIEMPRE la herramienta searchKnowledgeBase
2. Para reservas de clientes → usa lookupReservation con el nombre o la fecha
3. NUNCA inventes datos. Si una herramienta no devuelve resultados → indícalo claramente
4. Responde en español, de forma profesional, concisa y amable
5. Cuando uses searchKnowledgeBase, cita la fuente: [Fuente: nombre]
6. Si no puedes ayudar con algo, indica qué información necesitarías para hacerlo";

#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub max_steps: usize,
    pub history_window: usize,
    pub tool_timeout: Duration,
    pub completion: CompletionOptions,
    pub system_prompt: String,
}

impl AgentSettings {
    pub fn from_config(agent: &AgentConfig, generation: &GenerationConfig) -> Self {
        Self {
            max_steps: agent.max_steps.max(1),
            history_window: agent.history_window.max(1),
            tool_timeout: Duration::from_secs(agent.tool_timeout_secs),
            completion: CompletionOptions {
                temperature: generation.temperature,
                max_tokens: generation.max_output_tokens,
            },
            system_prompt: agent
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default(), &GenerationConfig::default())
    }
}

/// Everything one turn produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub answer: String,
    pub invocations: Vec<ToolInvocation>,
    /// Best knowledge-search score seen during the turn.
    pub top_score: f32,
    /// Model calls made.
    pub steps: usize,
}

pub struct Agent {
    model: Arc<dyn ChatModel>,
    tools: ToolContext,
    settings: AgentSettings,
}

impl Agent {
    pub fn new(model: Arc<dyn ChatModel>, tools: ToolContext, settings: AgentSettings) -> Self {
        Self {
            model,
            tools,
            settings,
        }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Run one turn over `history` (oldest first).
    pub async fn run_turn(&self, history: &[ChatMessage], turn: &TurnContext) -> Result<TurnOutcome> {
        let window = self.settings.history_window;
        let recent = &history[history.len().saturating_sub(window)..];

        let mut messages = Vec::with_capacity(recent.len() + 1);
        messages.push(ChatMessage::system(&self.settings.system_prompt));
        messages.extend(
            recent
                .iter()
                .filter(|m| matches!(m.role, Role::User | Role::Assistant))
                .cloned(),
        );

        let specs = tool_specs();
        let mut confidence = TurnConfidence::new();
        let mut invocations = Vec::new();

        let mut step = 0;
        loop {
            step += 1;
            let last_step = step >= self.settings.max_steps;
            let tools = if last_step { &[][..] } else { &specs[..] };

            let response = self
                .model
                .complete(&messages, tools, self.settings.completion)
                .await
                .with_context(|| format!("chat model call failed at step {}", step))?;

            if response.tool_calls.is_empty() || last_step {
                if last_step && !response.tool_calls.is_empty() {
                    tracing::warn!(
                        steps = step,
                        ignored = response.tool_calls.len(),
                        "step budget exhausted, ignoring tool calls"
                    );
                }
                return Ok(TurnOutcome {
                    answer: response.text,
                    invocations,
                    top_score: confidence.value(),
                    steps: step,
                });
            }

            messages.push(ChatMessage::assistant_with_calls(
                response.text.clone(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                let invocation = self.invoke(call, turn, &mut confidence).await;
                messages.push(ChatMessage::tool_result(&call.id, invocation.output.to_string()));
                invocations.push(invocation);
            }
        }
    }

    async fn invoke(
        &self,
        call: &ToolCall,
        turn: &TurnContext,
        confidence: &mut TurnConfidence,
    ) -> ToolInvocation {
        let started = Instant::now();
        let timeout = self.settings.tool_timeout;

        let result = tokio::time::timeout(timeout, self.tools.call(&call.name, &call.arguments, turn))
            .await
            .unwrap_or_else(|_| {
                Err(ToolError::Timeout {
                    tool: call.name.clone(),
                    secs: timeout.as_secs(),
                })
            });

        let (output, success) = match result {
            Ok(outcome) => {
                if let Some(score) = outcome.output.top_score() {
                    confidence.observe(score);
                }
                (outcome.output.to_json(), outcome.success)
            }
            Err(err) => {
                tracing::warn!(tool = %call.name, "tool call rejected: {}", err);
                (err.to_json(), false)
            }
        };

        tracing::info!(
            tool = %call.name,
            arguments = %call.arguments,
            success,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool call"
        );

        ToolInvocation {
            name: call.name.clone(),
            input: call.arguments.clone(),
            output,
            success,
        }
    }
}

/// The most recent user message, used as the traced guest input.
pub fn last_user_message(history: &[ChatMessage]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
}
