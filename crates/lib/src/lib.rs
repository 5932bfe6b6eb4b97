//! Parley core library: backend detection, the tool-calling agent loop, request routing,
//! sessions and download tokens. The CLI drives it in-process.

pub mod agent;
pub mod agent_ctx;
pub mod backend;
pub mod capability;
pub mod config;
pub mod downloads;
pub mod init;
pub mod llm;
pub mod orchestrator;
pub mod runtime;
pub mod session;
pub mod subagents;
pub mod tool_source;
pub mod tools;

#[cfg(test)]
mod test_support;
