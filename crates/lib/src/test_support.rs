//! Scripted backend and tool fakes shared by unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::BackendConnector;
use crate::llm::{ChatMessage, ChatResponse, LlmBackend, LlmError, ToolCall, ToolDefinition};
use crate::tools::ToolExecutor;

/// One recorded backend call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools_offered: bool,
}

type Fallback = Box<dyn Fn(usize) -> Result<ChatResponse, LlmError> + Send + Sync>;

/// Replays queued responses in order; when the queue is empty, `fallback` answers.
pub struct ScriptedBackend {
    queue: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    fallback: Fallback,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Box::new(|_| Ok(text("(no more scripted replies)"))),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(
        mut self,
        f: impl Fn(usize) -> Result<ChatResponse, LlmError> + Send + Sync + 'static,
    ) -> Self {
        self.fallback = Box::new(f);
        self
    }

    pub fn then(self, response: Result<ChatResponse, LlmError>) -> Self {
        self.queue.lock().unwrap().push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ChatResponse, LlmError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(RecordedCall {
                model: model.to_string(),
                messages: messages.to_vec(),
                tools_offered: tools.is_some_and(|t| !t.is_empty()),
            });
            calls.len()
        };
        let next = self.queue.lock().unwrap().pop_front();
        next.unwrap_or_else(|| (self.fallback)(n))
    }
}

/// Hands out the same backend for every new conversation.
pub struct FixedConnector(pub Arc<ScriptedBackend>);

#[async_trait]
impl BackendConnector for FixedConnector {
    async fn connect(&self) -> Arc<dyn LlmBackend> {
        self.0.clone()
    }
}

pub fn text(content: &str) -> ChatResponse {
    ChatResponse {
        message: Some(ChatMessage::assistant(content, None)),
    }
}

pub fn native_calls(calls: Vec<ToolCall>) -> ChatResponse {
    ChatResponse {
        message: Some(ChatMessage::assistant("", Some(calls))),
    }
}

/// Echo tool: `echo` returns its `text` argument after `delay_ms`.
pub struct EchoTools;

#[async_trait]
impl ToolExecutor for EchoTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::function(
            "echo",
            "Echo text back after an optional delay.",
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" }, "delay_ms": { "type": "integer" } },
                "required": ["text"]
            }),
        )]
    }

    async fn execute(&self, name: &str, arguments: &str) -> String {
        let args: serde_json::Value = match serde_json::from_str(arguments) {
            Ok(v) => v,
            Err(e) => return crate::tools::error_result(name, e),
        };
        if let Some(ms) = args.get("delay_ms").and_then(|v| v.as_u64()) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        args.get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }
}
