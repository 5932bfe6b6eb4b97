//! Agent turn: drive one conversation through zero or more tool rounds to a final answer.
//! When the model returns tool calls (native, or written out as text), we execute them
//! concurrently, append the results in request order and re-call the model until it answers
//! or the round limit is hit.
//!
//! Models that reject a tool schema are remembered in the capability registry; from then on
//! their conversations get a textual tool catalog in the system message instead.

use std::sync::Arc;

use futures_util::future::join_all;

use crate::capability::{CapabilityRegistry, ToolSupport};
use crate::config::DEFAULT_MAX_TOOL_ROUNDS;
use crate::downloads::DOWNLOAD_PATH_PREFIX;
use crate::llm::{
    ChatMessage, ChatResponse, LlmBackend, LlmError, MessageContent, Role, ToolDefinition,
};
use crate::tool_source::{render_tool_catalog, ToolRequestSource, MANUAL_CALLING_CONVENTION};
use crate::tools::ToolExecutor;

/// Reply when the round limit is exhausted without a final answer.
pub const STEP_LIMIT_MESSAGE: &str =
    "I stopped after reaching the maximum number of tool steps for this request. Try asking for a smaller part of the task.";

/// Markers that mean a reply already carries a link (download or hyperlink).
const LINK_MARKERS: &[&str] = &[DOWNLOAD_PATH_PREFIX, "](", "<a href"];

/// Tool-calling engine for one conversation. Owns the message history; the first message is
/// always the single system message.
pub struct ChatAgent {
    backend: Arc<dyn LlmBackend>,
    model: String,
    capabilities: Arc<CapabilityRegistry>,
    tools: Arc<dyn ToolExecutor>,
    messages: Vec<ChatMessage>,
    max_rounds: usize,
}

impl ChatAgent {
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        capabilities: Arc<CapabilityRegistry>,
        tools: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            capabilities,
            tools,
            messages: vec![ChatMessage::system(system_prompt)],
            max_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    /// Set the maximum number of model round-trips per request (at least 1).
    pub fn with_max_rounds(mut self, max: usize) -> Self {
        self.max_rounds = max.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn system_prompt(&self) -> String {
        self.messages.first().map(ChatMessage::text).unwrap_or_default()
    }

    /// Drop everything but the system message.
    pub fn reset_context(&mut self) {
        self.messages.truncate(1);
    }

    /// Replace the system message and reset the conversation.
    pub fn set_system_prompt(&mut self, text: impl Into<String>) {
        self.messages.clear();
        self.messages.push(ChatMessage::system(text));
    }

    /// Run one request. Returns None for blank input or when the backend fails.
    pub async fn send_message(&mut self, content: impl Into<MessageContent>) -> Option<String> {
        let content = content.into();
        if content.is_blank() {
            log::debug!("agent: ignoring blank message");
            return None;
        }
        let vision = content.has_image();
        self.messages.push(ChatMessage::user(content));

        let definitions = self.tools.definitions();
        let mut tool_outputs: Vec<String> = Vec::new();
        let mut rounds = 0;

        while rounds < self.max_rounds {
            let support = self.capabilities.get(&self.model).await;
            if support == ToolSupport::Unsupported && !definitions.is_empty() {
                self.inject_tool_catalog(&definitions);
            }
            let offer_tools =
                !vision && !definitions.is_empty() && support != ToolSupport::Unsupported;

            let response = match self.request(offer_tools.then_some(&definitions[..])).await {
                Ok(r) => r,
                Err(e) if offer_tools && e.is_tools_unsupported() => {
                    log::info!(
                        "agent: {} rejected native tools, switching to text tool calls",
                        self.model
                    );
                    self.capabilities
                        .set(&self.model, ToolSupport::Unsupported)
                        .await;
                    continue;
                }
                Err(e) => {
                    log::warn!("agent: model request failed: {}", e);
                    return None;
                }
            };
            rounds += 1;
            if offer_tools && support == ToolSupport::Unknown {
                self.capabilities
                    .set(&self.model, ToolSupport::Supported)
                    .await;
            }

            let message = response
                .message
                .unwrap_or_else(|| ChatMessage::assistant("", None));
            let source = ToolRequestSource::from_message(&message);
            let text = message.text();

            if source.is_empty() {
                if !text.trim().is_empty() {
                    self.messages.push(ChatMessage::assistant(text.as_str(), None));
                }
                return merge_reply(&text, &tool_outputs);
            }

            log::debug!(
                "agent: round {} requested {} tool call(s)",
                rounds,
                source.requests().len()
            );
            self.messages
                .push(ChatMessage::assistant(text, source.native_calls()));
            let tools = Arc::clone(&self.tools);
            let requests = source.requests();
            let outputs = join_all(
                requests
                    .iter()
                    .map(|call| tools.execute(&call.function.name, &call.function.arguments)),
            )
            .await;
            for (call, output) in requests.iter().zip(outputs) {
                self.messages.push(ChatMessage::tool_result(
                    call.id.clone(),
                    call.function.name.clone(),
                    output.clone(),
                ));
                tool_outputs.push(output);
            }
        }

        log::debug!("agent: max tool rounds ({}) reached", self.max_rounds);
        Some(STEP_LIMIT_MESSAGE.to_string())
    }

    async fn request(&self, tools: Option<&[ToolDefinition]>) -> Result<ChatResponse, LlmError> {
        self.backend.chat(&self.model, &self.messages, tools).await
    }

    /// Append the textual tool catalog to the system message once.
    fn inject_tool_catalog(&mut self, definitions: &[ToolDefinition]) {
        let Some(system) = self.messages.first_mut().filter(|m| m.role == Role::System) else {
            return;
        };
        let current = system.text();
        if current.contains(MANUAL_CALLING_CONVENTION) {
            return;
        }
        let catalog = render_tool_catalog(definitions);
        let merged = if current.trim().is_empty() {
            catalog
        } else {
            format!("{}\n\n{}", current, catalog)
        };
        system.content = Some(MessageContent::Text(merged));
    }
}

/// Final reply for a terminal round. Tool outputs are appended after the model's text unless
/// the text already carries a link; with blank text, the outputs alone are the reply.
fn merge_reply(text: &str, tool_outputs: &[String]) -> Option<String> {
    if !text.trim().is_empty() {
        if tool_outputs.is_empty() || LINK_MARKERS.iter().any(|m| text.contains(m)) {
            return Some(text.to_string());
        }
        return Some(format!("{}\n\n{}", text, tool_outputs.join("\n\n")));
    }
    if !tool_outputs.is_empty() {
        return Some(tool_outputs.join("\n\n"));
    }
    None
}
