//! Tool layer: the capability interface the agent loop calls, typed tool arguments and the
//! built-in tool box (workspace files, URL fetch).

mod files;
mod web;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::downloads::{download_link, DownloadStore};
pub use crate::llm::ToolDefinition;
pub use files::Workspace;
pub use web::{fetch_text, find_url};

pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";
pub const FETCH_URL: &str = "fetch_url";

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("path is outside the workspace: {0}")]
    OutsideWorkspace(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for ToolError {
    fn from(e: reqwest::Error) -> Self {
        ToolError::Fetch(e.to_string())
    }
}

/// Executes tools by name with JSON-encoded arguments.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tool schemas offered to the model.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Run a tool. Always returns text: failures come back as `Error executing <name>: ...`
    /// so the conversation can continue.
    async fn execute(&self, name: &str, arguments: &str) -> String;
}

/// Text result for a failed tool call.
pub fn error_result(name: &str, err: impl fmt::Display) -> String {
    format!("Error executing {}: {}", name, err)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReadFileArgs {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WriteFileArgs {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FetchUrlArgs {
    pub url: String,
}

/// Decoded arguments, one variant per known tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolArgs {
    ReadFile(ReadFileArgs),
    WriteFile(WriteFileArgs),
    FetchUrl(FetchUrlArgs),
}

impl ToolArgs {
    /// Validate and decode the model's argument string for `name`. Empty arguments decode as `{}`.
    pub fn decode(name: &str, arguments: &str) -> Result<Self, ToolError> {
        let raw = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };
        match name {
            READ_FILE => Ok(ToolArgs::ReadFile(parse_args(raw)?)),
            WRITE_FILE => Ok(ToolArgs::WriteFile(parse_args(raw)?)),
            FETCH_URL => {
                let args: FetchUrlArgs = parse_args(raw)?;
                if args.url.trim().is_empty() {
                    return Err(ToolError::InvalidArguments("url is empty".to_string()));
                }
                Ok(ToolArgs::FetchUrl(args))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

fn parse_args<T: DeserializeOwned>(raw: &str) -> Result<T, ToolError> {
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Built-in tools over a workspace directory and the web. `write_file` registers the written
/// file with the download store and reports its link.
pub struct ToolBox {
    workspace: Workspace,
    downloads: Arc<DownloadStore>,
    http: reqwest::Client,
    timeout: Duration,
}

impl ToolBox {
    pub fn new(workspace: Workspace, downloads: Arc<DownloadStore>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            workspace,
            downloads,
            http,
            timeout,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub async fn read_file(&self, path: &str) -> Result<String, ToolError> {
        self.workspace.read(path).await
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Result<String, ToolError> {
        let written = self.workspace.write(path, content).await?;
        let token = self.downloads.create(&written).await;
        Ok(format!(
            "Wrote {} bytes to {}. Download: {}",
            content.len(),
            path.trim(),
            download_link(&token)
        ))
    }

    pub async fn list_files(&self, dir: &str) -> Result<Vec<String>, ToolError> {
        self.workspace.list(dir).await
    }

    pub async fn fetch_url(&self, url: &str) -> Result<String, ToolError> {
        fetch_text(&self.http, url).await
    }

    async fn run(&self, args: ToolArgs) -> Result<String, ToolError> {
        match args {
            ToolArgs::ReadFile(a) => self.read_file(&a.path).await,
            ToolArgs::WriteFile(a) => self.write_file(&a.path, &a.content).await,
            ToolArgs::FetchUrl(a) => self.fetch_url(&a.url).await,
        }
    }
}

#[async_trait]
impl ToolExecutor for ToolBox {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::function(
                READ_FILE,
                "Read a text file from the workspace.",
                json!({
                    "type": "object",
                    "properties": { "path": { "type": "string", "description": "Path relative to the workspace" } },
                    "required": ["path"]
                }),
            ),
            ToolDefinition::function(
                WRITE_FILE,
                "Write a text file in the workspace and get a download link for it.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Path relative to the workspace" },
                        "content": { "type": "string", "description": "Full file content" }
                    },
                    "required": ["path", "content"]
                }),
            ),
            ToolDefinition::function(
                FETCH_URL,
                "Fetch a web page and return its text.",
                json!({
                    "type": "object",
                    "properties": { "url": { "type": "string", "description": "http or https URL" } },
                    "required": ["url"]
                }),
            ),
        ]
    }

    async fn execute(&self, name: &str, arguments: &str) -> String {
        let result = match ToolArgs::decode(name, arguments) {
            Ok(args) => match tokio::time::timeout(self.timeout, self.run(args)).await {
                Ok(r) => r,
                Err(_) => Err(ToolError::Timeout(self.timeout)),
            },
            Err(e) => Err(e),
        };
        match result {
            Ok(out) => out,
            Err(e) => {
                log::warn!("tools: {} failed: {}", name, e);
                error_result(name, e)
            }
        }
    }
}
