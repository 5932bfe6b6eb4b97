//! Ollama API client (http://127.0.0.1:11434 by default).
//! Only the native model listing lives here; chat goes through Ollama's OpenAI-compatible `/v1`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::backend::LlmError;

pub const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Client for the Ollama HTTP API.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// `base_url` may be the server root or its `/v1` OpenAI-compatible prefix.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: server_root(&base_url.into()),
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

    /// GET /api/tags: list locally available models.
    pub async fn list_models(&self) -> Result<Vec<OllamaModel>, LlmError> {
        let url = format!("{}/api/tags", self.base_url);
        let res = self.client.get(&url).send().await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }
        let data: TagsResponse = res
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        Ok(data.models.unwrap_or_default())
    }
}

/// Strip a trailing `/v1` so native endpoints resolve against the server root.
pub fn server_root(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    trimmed.strip_suffix("/v1").unwrap_or(trimmed).to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaModel {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub details: Option<OllamaModelDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaModelDetails {
    #[serde(default)]
    pub family: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Option<Vec<OllamaModel>>,
}
