//! Where a round's tool requests come from: native tool calls in the backend response, or
//! calls the model wrote out as text because it was given a textual tool catalog.
//!
//! Manual calls look like `TOOL_CALL: "read_file" {"path": "notes.txt"}`. Each marker must be
//! followed by a JSON object; a marker with malformed JSON is skipped.

use std::sync::OnceLock;

use regex::Regex;

use crate::llm::{ChatMessage, ToolCall, ToolDefinition};

pub const MANUAL_TOOL_MARKER: &str = "TOOL_CALL:";

/// Instruction appended to the system message when the model has no native tool calling.
/// Its presence in the system message marks the catalog as injected.
pub const MANUAL_CALLING_CONVENTION: &str = "To use a tool, reply with one line per call in exactly this form and nothing else on that line:\nTOOL_CALL: \"<tool_name>\" {<JSON arguments>}\nAfter the tool results arrive, answer the user normally without TOOL_CALL lines.";

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"TOOL_CALL:\s*"([A-Za-z0-9_.\-]+)"\s*"#).expect("valid tool call pattern")
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequestSource {
    Native(Vec<ToolCall>),
    Manual(Vec<ToolCall>),
    None,
}

impl ToolRequestSource {
    /// Native calls win; only when there are none is the text scanned for manual calls.
    pub fn from_message(message: &ChatMessage) -> Self {
        if let Some(calls) = message.tool_calls.as_ref().filter(|c| !c.is_empty()) {
            return ToolRequestSource::Native(calls.clone());
        }
        let manual = parse_manual_tool_calls(&message.text());
        if manual.is_empty() {
            ToolRequestSource::None
        } else {
            ToolRequestSource::Manual(manual)
        }
    }

    pub fn requests(&self) -> &[ToolCall] {
        match self {
            ToolRequestSource::Native(calls) | ToolRequestSource::Manual(calls) => calls,
            ToolRequestSource::None => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requests().is_empty()
    }

    /// Tool-call metadata to keep on the assistant turn (native only).
    pub fn native_calls(&self) -> Option<Vec<ToolCall>> {
        match self {
            ToolRequestSource::Native(calls) => Some(calls.clone()),
            _ => None,
        }
    }
}

/// Scan text for manual tool calls. Each match gets a fresh id.
pub fn parse_manual_tool_calls(text: &str) -> Vec<ToolCall> {
    marker_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let rest = &text[caps.get(0)?.end()..];
            let mut values = serde_json::Deserializer::from_str(rest).into_iter::<serde_json::Value>();
            match values.next() {
                Some(Ok(args @ serde_json::Value::Object(_))) => Some(ToolCall::new(
                    format!("call_{}", uuid::Uuid::new_v4().simple()),
                    name,
                    args.to_string(),
                )),
                _ => {
                    log::debug!("tool_source: skipping manual call to {} with malformed arguments", name);
                    None
                }
            }
        })
        .collect()
}

/// Textual tool catalog plus calling convention, for models without native tool calling.
pub fn render_tool_catalog(tools: &[ToolDefinition]) -> String {
    let mut out = String::from("## Tools\nYou can call these tools:\n");
    for t in tools {
        out.push_str(&format!(
            "- {}: {}\n  arguments (JSON schema): {}\n",
            t.function.name,
            t.function.description.as_deref().unwrap_or(""),
            t.function.parameters
        ));
    }
    out.push('\n');
    out.push_str(MANUAL_CALLING_CONVENTION);
    out
}
