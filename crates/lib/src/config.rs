//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.parley/config.json`) and environment.
//! Every field has a default, so an empty `{}` file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Model-serving endpoint and detection settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Agent defaults (model, prompt, tool loop bounds).
    #[serde(default)]
    pub agents: AgentsConfig,

    /// Session lifetime settings.
    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// Where the model lives and how to find out what it speaks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// Candidate base URL (default "http://127.0.0.1:1234/v1"). Overridden by PARLEY_BASE_URL env.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Force a backend flavor and skip probing: "openai", "groq", "openrouter", "mistral",
    /// "openai-compatible" or "ollama".
    #[serde(default)]
    pub flavor: Option<String>,

    /// API key for hosted providers. Overridden by PARLEY_API_KEY env.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Port probed for a local Ollama server (default 11434).
    #[serde(default = "default_ollama_port")]
    pub ollama_port: u16,

    /// Timeout for each detection probe in seconds (default 2).
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

/// Agent defaults (model, workspace, loop bounds).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsConfig {
    /// Model used when a session does not ask for one. When absent, the first model in the
    /// backend's catalog is used.
    pub default_model: Option<String>,
    /// System prompt used when the workspace has no AGENTS.md.
    pub system_prompt: Option<String>,
    /// Maximum model round-trips per request (default 5).
    pub max_tool_rounds: Option<usize>,
    /// Timeout for a single tool call in seconds (default 60).
    pub tool_timeout_secs: Option<u64>,
    /// Workspace root for file tools (default ~/.parley/workspace).
    pub workspace: Option<PathBuf>,
}

/// Idle eviction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsConfig {
    /// Sessions untouched for longer than this are evicted (default 1800).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// How often the sweeper runs (default 60).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 60;

fn default_base_url() -> String {
    "http://127.0.0.1:1234/v1".to_string()
}

fn default_ollama_port() -> u16 {
    crate::llm::DEFAULT_OLLAMA_PORT
}

fn default_probe_timeout_secs() -> u64 {
    2
}

fn default_idle_timeout_secs() -> u64 {
    1800
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            flavor: None,
            api_key: None,
            ollama_port: default_ollama_port(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl BackendConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }
}

impl AgentsConfig {
    pub fn max_tool_rounds(&self) -> usize {
        self.max_tool_rounds
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_TOOL_ROUNDS)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(
            self.tool_timeout_secs
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS),
        )
    }
}

impl SessionsConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the backend base URL: env PARLEY_BASE_URL overrides config.
pub fn resolve_base_url(config: &Config) -> String {
    non_empty_env("PARLEY_BASE_URL").unwrap_or_else(|| config.backend.base_url.trim().to_string())
}

/// Resolve the API key: env PARLEY_API_KEY overrides config.
pub fn resolve_api_key(config: &Config) -> Option<String> {
    non_empty_env("PARLEY_API_KEY").or_else(|| {
        config
            .backend
            .api_key
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PARLEY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".parley").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Resolve the workspace directory used by file tools and for AGENTS.md.
pub fn resolve_workspace_dir(config: &Config) -> PathBuf {
    config
        .agents
        .workspace
        .clone()
        .or_else(|| dirs::home_dir().map(|h| h.join(".parley").join("workspace")))
        .unwrap_or_else(|| PathBuf::from("workspace"))
}

/// Load config from the given path (or PARLEY_CONFIG_PATH / default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
