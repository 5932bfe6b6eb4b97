//! Backend seam: one chat-completion call against whatever serving protocol was detected.

use async_trait::async_trait;

use super::types::{ChatMessage, ChatResponse, ToolDefinition};

/// Phrases backends use when a model rejects a tool schema.
const TOOLS_UNSUPPORTED_HINTS: &[&str] = &[
    "does not support tools",
    "doesn't support tools",
    "tools are not supported",
    "tools not supported",
    "tool use is not supported",
    "tool calling is not supported",
    "function calling is not supported",
    "does not support function calling",
    "unsupported parameter: tools",
    "unsupported parameter: tool_choice",
];

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("api error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

impl LlmError {
    /// True when the error says the model cannot take a tool schema.
    pub fn is_tools_unsupported(&self) -> bool {
        let msg = self.to_string().to_lowercase();
        TOOLS_UNSUPPORTED_HINTS.iter().any(|h| msg.contains(h))
    }
}

/// A chat-completion endpoint. When `tools` is given, tool choice is left to the model ("auto").
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ChatResponse, LlmError>;
}
