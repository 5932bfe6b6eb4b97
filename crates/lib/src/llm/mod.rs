//! LLM abstraction: message types, the backend trait and the HTTP clients.
//!
//! Chat always speaks the OpenAI-compatible protocol; Ollama's native API is used only for
//! its model listing.

mod backend;
mod ollama;
mod openai_compat;
mod types;

pub use backend::{LlmBackend, LlmError};
pub use ollama::{server_root, OllamaClient, OllamaModel, OllamaModelDetails, DEFAULT_OLLAMA_PORT};
pub use openai_compat::{parse_model_listing, OpenAiCompatClient, RemoteModel};
pub use types::{
    ChatMessage, ChatResponse, ContentPart, ImageUrl, MessageContent, Role, ToolCall,
    ToolCallFunction, ToolDefinition, ToolFunctionDefinition,
};
