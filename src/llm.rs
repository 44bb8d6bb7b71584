//! Chat-completion models with function calling.
//!
//! [`ChatModel`] is the seam the agent loop and the HyDE generator talk
//! through. [`OpenAIChatModel`] speaks the OpenAI `/chat/completions`
//! wire format (OpenRouter by default); tests substitute scripted models.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use concierge_harness_core::embedding::HypotheticalGenerator;

use crate::config::GenerationConfig;
use crate::http;

/// System prompt used to produce hypothetical answers for HyDE retrieval.
pub const DEFAULT_HYDE_PROMPT: &str = "Eres un experto en restaurantes. Dado una pregunta de cliente, \
     genera una respuesta hipotética breve y factual (2-3 frases) como si \
     fueras el restaurante respondiendo. No menciones el nombre del restaurante. \
     Responde en español.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Parsed arguments. Unparseable argument text is kept as a JSON string.
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }

    /// OpenAI wire representation.
    pub fn to_openai(&self) -> Value {
        match self.role {
            Role::Assistant if !self.tool_calls.is_empty() => {
                let content = if self.content.is_empty() {
                    Value::Null
                } else {
                    json!(self.content)
                };
                let calls: Vec<Value> = self
                    .tool_calls
                    .iter()
                    .map(|c| {
                        let arguments = match &c.arguments {
                            Value::String(raw) => raw.clone(),
                            other => other.to_string(),
                        };
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": { "name": c.name, "arguments": arguments },
                        })
                    })
                    .collect();
                json!({ "role": "assistant", "content": content, "tool_calls": calls })
            }
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": self.tool_call_id.clone().unwrap_or_default(),
                "content": self.content,
            }),
            role => json!({ "role": role, "content": self.content }),
        }
    }
}

/// Function-calling schema advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// One model reply: text, tool calls, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Complete `messages`. An empty `tools` slice disables tool calling.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        options: CompletionOptions,
    ) -> Result<ChatResponse>;
}

// ============ Disabled Model ============

pub struct DisabledChatModel;

#[async_trait]
impl ChatModel for DisabledChatModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSpec],
        _options: CompletionOptions,
    ) -> Result<ChatResponse> {
        bail!("Generation provider is disabled")
    }
}

// ============ OpenAI-compatible Model ============

pub struct OpenAIChatModel {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl OpenAIChatModel {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: http::api_key_from_env(&config.api_key_env)?,
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        options: CompletionOptions,
    ) -> Result<ChatResponse> {
        let wire: Vec<Value> = messages.iter().map(ChatMessage::to_openai).collect();
        let mut body = json!({
            "model": self.model,
            "messages": wire,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });
        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
        }

        let auth = format!("Bearer {}", self.api_key);
        let json = http::post_json(
            &self.client,
            "Chat",
            &self.url,
            &[("Authorization", auth.as_str())],
            &body,
            self.max_retries,
        )
        .await?;
        parse_chat_response(&json)
    }
}

/// Parse `choices[0].message` of a chat-completions response.
pub fn parse_chat_response(json: &Value) -> Result<ChatResponse> {
    let message = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message"))?;

    let text = message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();

    let tool_calls = message
        .get("tool_calls")
        .and_then(|t| t.as_array())
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .filter_map(|(i, call)| {
                    let function = call.get("function")?;
                    let name = function.get("name")?.as_str()?.to_string();
                    let raw = function
                        .get("arguments")
                        .and_then(|a| a.as_str())
                        .unwrap_or("{}");
                    let arguments = if raw.trim().is_empty() {
                        json!({})
                    } else {
                        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
                    };
                    let id = call
                        .get("id")
                        .and_then(|id| id.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("call_{}", i));
                    Some(ToolCall {
                        id,
                        name,
                        arguments,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ChatResponse { text, tool_calls })
}

/// Create the configured [`ChatModel`].
pub fn create_chat_model(config: &GenerationConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChatModel)),
        "openai" => Ok(Arc::new(OpenAIChatModel::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

// ============ HyDE ============

/// [`HypotheticalGenerator`] backed by a chat model.
pub struct HydeGenerator {
    model: Arc<dyn ChatModel>,
    prompt: String,
    options: CompletionOptions,
}

impl HydeGenerator {
    pub fn new(model: Arc<dyn ChatModel>, config: &GenerationConfig) -> Self {
        Self {
            model,
            prompt: config
                .hyde_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_HYDE_PROMPT.to_string()),
            options: CompletionOptions {
                temperature: config.temperature,
                max_tokens: config.hyde_max_tokens,
            },
        }
    }
}

#[async_trait]
impl HypotheticalGenerator for HydeGenerator {
    async fn generate_hypothetical(&self, query: &str) -> Result<String> {
        let messages = [ChatMessage::system(&self.prompt), ChatMessage::user(query)];
        let response = self.model.complete(&messages, &[], self.options).await?;
        Ok(response.text)
    }
}
