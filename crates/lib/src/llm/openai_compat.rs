//! OpenAI-compatible client: `/models` and `/chat/completions`.
//!
//! Used for hosted APIs, generic OpenAI-compatible servers (LM Studio, vLLM, llama.cpp) and
//! Ollama's `/v1` surface. The base URL is the prefix the endpoints hang off (e.g.
//! `http://127.0.0.1:1234/v1`).

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::backend::{LlmBackend, LlmError};
use super::types::{ChatMessage, ChatResponse, MessageContent, Role, ToolCall, ToolDefinition};

/// Client for an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client: reqwest::Client::new(),
        }
    }

    /// Same client with a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    /// GET /models: raw listing, accepting the array, `{data:[...]}` and `{models:[...]}` shapes.
    pub async fn list_models(&self) -> Result<Vec<RemoteModel>, LlmError> {
        let url = format!("{}/models", self.base_url);
        let res = self.authorize(self.client.get(&url)).send().await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }
        let body: serde_json::Value = res.json().await?;
        parse_model_listing(&body)
            .ok_or_else(|| LlmError::Decode("unrecognized model listing shape".to_string()))
    }

    /// POST /chat/completions, non-streaming. Tools are sent with `tool_choice: "auto"`.
    pub async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let tools = tools.filter(|t| !t.is_empty());
        let body = OpenAiChatRequest {
            model: model.to_string(),
            messages: messages_to_openai(messages),
            stream: false,
            tool_choice: tools.map(|_| "auto"),
            tools: tools.map(<[ToolDefinition]>::to_vec),
        };
        let res = self.authorize(self.client.post(&url).json(&body)).send().await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }
        let data: OpenAiChatResponse = res
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        openai_response_to_chat_response(data)
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatClient {
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ChatResponse, LlmError> {
        self.chat_completion(model, messages, tools).await
    }
}

/// One entry of a model listing, normalized across response shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteModel {
    pub id: String,
    pub size: Option<u64>,
    pub family: Option<String>,
}

impl RemoteModel {
    fn from_value(v: &serde_json::Value) -> Option<Self> {
        let id = ["id", "name", "model"]
            .iter()
            .find_map(|k| v.get(*k).and_then(|s| s.as_str()))
            .map(str::trim)
            .filter(|s| !s.is_empty())?;
        Some(Self {
            id: id.to_string(),
            size: v.get("size").and_then(|s| s.as_u64()),
            family: v
                .get("details")
                .and_then(|d| d.get("family"))
                .and_then(|f| f.as_str())
                .map(str::to_string),
        })
    }
}

/// Parse a model listing: bare array of objects, `{data:[...]}` or `{models:[...]}`.
/// Returns None when the body has none of these shapes.
pub fn parse_model_listing(body: &serde_json::Value) -> Option<Vec<RemoteModel>> {
    let entries = match body {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(map) => map
            .get("data")
            .or_else(|| map.get("models"))
            .and_then(|v| v.as_array())?,
        _ => return None,
    };
    Some(entries.iter().filter_map(RemoteModel::from_value).collect())
}

// --- OpenAI wire types ---

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
enum OpenAiMessage {
    System {
        content: String,
    },
    User {
        content: MessageContent,
    },
    Assistant {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

/// Convert internal messages to OpenAI format. Tool results whose id was never announced by an
/// assistant turn (manually parsed calls) become user messages so backends without tool
/// support still accept the history.
fn messages_to_openai(messages: &[ChatMessage]) -> Vec<OpenAiMessage> {
    let mut out = Vec::with_capacity(messages.len());
    let mut announced: HashSet<&str> = HashSet::new();

    for m in messages {
        match m.role {
            Role::System => out.push(OpenAiMessage::System { content: m.text() }),
            Role::User => out.push(OpenAiMessage::User {
                content: m
                    .content
                    .clone()
                    .unwrap_or_else(|| MessageContent::Text(String::new())),
            }),
            Role::Assistant => {
                let tool_calls = m.tool_calls.as_ref().filter(|c| !c.is_empty());
                if let Some(calls) = tool_calls {
                    announced.extend(calls.iter().map(|c| c.id.as_str()));
                }
                out.push(OpenAiMessage::Assistant {
                    content: m.text(),
                    tool_calls: tool_calls.cloned(),
                });
            }
            Role::Tool => match m.tool_call_id.as_deref() {
                Some(id) if announced.contains(id) => out.push(OpenAiMessage::Tool {
                    tool_call_id: id.to_string(),
                    content: m.text(),
                }),
                _ => out.push(OpenAiMessage::User {
                    content: MessageContent::Text(format!(
                        "[Tool result: {}] {}",
                        m.name.as_deref().unwrap_or("tool"),
                        m.text()
                    )),
                }),
            },
        }
    }
    out
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Option<Vec<OpenAiChoice>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: Option<OpenAiResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseToolCall {
    id: Option<String>,
    #[serde(rename = "type")]
    typ: Option<String>,
    function: Option<OpenAiResponseToolCallFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseToolCallFunction {
    name: Option<String>,
    /// Usually a JSON string; some servers send an object.
    arguments: Option<serde_json::Value>,
}

fn openai_response_to_chat_response(data: OpenAiChatResponse) -> Result<ChatResponse, LlmError> {
    let message = data
        .choices
        .ok_or_else(|| LlmError::Decode("response has no choices".to_string()))?
        .into_iter()
        .next()
        .and_then(|c| c.message);
    let Some(m) = message else {
        return Ok(ChatResponse { message: None });
    };
    let tool_calls: Vec<ToolCall> = m
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .filter_map(|(i, tc)| {
            let f = tc.function?;
            let name = f.name.filter(|n| !n.is_empty())?;
            let arguments = match f.arguments {
                Some(serde_json::Value::String(s)) => s,
                Some(serde_json::Value::Null) | None => "{}".to_string(),
                Some(other) => other.to_string(),
            };
            Some(ToolCall {
                id: tc.id.unwrap_or_else(|| format!("call_{}", i)),
                typ: tc.typ.unwrap_or_else(|| "function".to_string()),
                function: super::types::ToolCallFunction { name, arguments },
            })
        })
        .collect();
    Ok(ChatResponse {
        message: Some(ChatMessage::assistant(
            m.content.unwrap_or_default(),
            if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
        )),
    })
}
