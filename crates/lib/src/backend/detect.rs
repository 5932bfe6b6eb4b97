//! Backend detection: which serving protocol answers at a candidate URL.
//!
//! Probes run in priority order (hosted provider by hostname, OpenAI-compatible `/models`,
//! Ollama `/api/tags` on its well-known port). Every probe is best-effort: failures fall
//! through to the next probe and are never surfaced to the caller.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tokio::sync::RwLock;

use crate::config::{self, Config};
use crate::llm::{parse_model_listing, LlmBackend, OllamaClient, OpenAiCompatClient};

/// Upper bound for one chat-completion call; local models can be slow on first load.
const CHAT_TIMEOUT: Duration = Duration::from_secs(300);

/// Hosted API providers recognized by hostname.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostedProvider {
    OpenAi,
    Groq,
    OpenRouter,
    Mistral,
}

impl HostedProvider {
    pub const ALL: [HostedProvider; 4] = [
        HostedProvider::OpenAi,
        HostedProvider::Groq,
        HostedProvider::OpenRouter,
        HostedProvider::Mistral,
    ];

    pub fn host(self) -> &'static str {
        match self {
            HostedProvider::OpenAi => "api.openai.com",
            HostedProvider::Groq => "api.groq.com",
            HostedProvider::OpenRouter => "openrouter.ai",
            HostedProvider::Mistral => "api.mistral.ai",
        }
    }

    /// Canonical path prefix of the provider's OpenAI-compatible API.
    pub fn path_prefix(self) -> &'static str {
        match self {
            HostedProvider::OpenAi | HostedProvider::Mistral => "/v1",
            HostedProvider::Groq => "/openai/v1",
            HostedProvider::OpenRouter => "/api/v1",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HostedProvider::OpenAi => "openai",
            HostedProvider::Groq => "groq",
            HostedProvider::OpenRouter => "openrouter",
            HostedProvider::Mistral => "mistral",
        }
    }

    fn from_host(host: &str) -> Option<Self> {
        let host = host.to_ascii_lowercase();
        Self::ALL.into_iter().find(|p| host == p.host())
    }
}

/// Serving protocol dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendFlavor {
    Hosted(HostedProvider),
    OpenAiCompatible,
    Ollama,
}

impl BackendFlavor {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendFlavor::Hosted(p) => p.as_str(),
            BackendFlavor::OpenAiCompatible => "openai-compatible",
            BackendFlavor::Ollama => "ollama",
        }
    }

    pub fn requires_auth(self) -> bool {
        matches!(self, BackendFlavor::Hosted(_))
    }
}

impl fmt::Display for BackendFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown backend flavor: {0}")]
pub struct UnknownFlavor(pub String);

impl FromStr for BackendFlavor {
    type Err = UnknownFlavor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if let Some(p) = HostedProvider::ALL.into_iter().find(|p| p.as_str() == s) {
            return Ok(BackendFlavor::Hosted(p));
        }
        match s.as_str() {
            "openai-compatible" | "openai_compatible" | "openaicompatible" | "lmstudio" => {
                Ok(BackendFlavor::OpenAiCompatible)
            }
            "ollama" => Ok(BackendFlavor::Ollama),
            _ => Err(UnknownFlavor(s)),
        }
    }
}

/// Result of detection: flavor, resolved base URL (chat endpoints hang off it) and whether
/// requests need an API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    pub flavor: BackendFlavor,
    pub base_url: String,
    pub requires_auth: bool,
}

impl BackendDescriptor {
    pub fn new(flavor: BackendFlavor, base_url: impl Into<String>) -> Self {
        Self {
            flavor,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            requires_auth: flavor.requires_auth(),
        }
    }
}

/// Detection knobs (probe timeout, Ollama port, forced flavor).
#[derive(Debug, Clone)]
pub struct DetectOptions {
    pub probe_timeout: Duration,
    pub ollama_port: u16,
    pub forced: Option<BackendFlavor>,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(2),
            ollama_port: crate::llm::DEFAULT_OLLAMA_PORT,
            forced: None,
        }
    }
}

/// Hands out a chat client for the backend currently in use.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self) -> Arc<dyn LlmBackend>;
}

/// Detected-backend state: per-URL descriptor cache plus the current backend and base URL.
/// One instance per runtime; tests build their own.
pub struct BackendRegistry {
    options: DetectOptions,
    api_key: Option<String>,
    http: reqwest::Client,
    cache: RwLock<HashMap<String, BackendDescriptor>>,
    current: RwLock<Option<BackendDescriptor>>,
    base_url: RwLock<String>,
}

impl BackendRegistry {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, options: DetectOptions) -> Self {
        let http = reqwest::Client::builder()
            .timeout(options.probe_timeout)
            .build()
            .unwrap_or_default();
        Self {
            options,
            api_key,
            http,
            cache: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            base_url: RwLock::new(normalize_url(&base_url.into())),
        }
    }

    /// Build from config. An unrecognized forced flavor is logged and ignored.
    pub fn from_config(config: &Config) -> Self {
        let forced = config.backend.flavor.as_deref().and_then(|f| match f.parse() {
            Ok(flavor) => Some(flavor),
            Err(e) => {
                log::warn!("detect: {}; probing instead", e);
                None
            }
        });
        Self::new(
            config::resolve_base_url(config),
            config::resolve_api_key(config),
            DetectOptions {
                probe_timeout: config.backend.probe_timeout(),
                ollama_port: config.backend.ollama_port,
                forced,
            },
        )
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// The base URL in use (configured, or rewritten by the last successful detection).
    pub async fn base_url(&self) -> String {
        self.base_url.read().await.clone()
    }

    pub async fn current(&self) -> Option<BackendDescriptor> {
        self.current.read().await.clone()
    }

    /// Switch to a new base URL. The current descriptor is dropped; call `detect_current`
    /// to probe the new URL.
    pub async fn set_base_url(&self, url: &str) {
        *self.base_url.write().await = normalize_url(url);
        *self.current.write().await = None;
    }

    /// Detect the backend at the current base URL.
    pub async fn detect_current(&self) -> Option<BackendDescriptor> {
        let url = self.base_url().await;
        self.detect(&url).await
    }

    /// Detect the backend behind `candidate`. On success the descriptor becomes current and its
    /// base URL replaces the configured one. None means no probe succeeded; callers keep using
    /// the configured URL.
    pub async fn detect(&self, candidate: &str) -> Option<BackendDescriptor> {
        let key = normalize_url(candidate);
        let cached = self.cache.read().await.get(&key).cloned();
        let found = match cached {
            Some(d) => Some(d),
            None => {
                let probed = self.probe(&key).await;
                if let Some(ref d) = probed {
                    self.cache.write().await.insert(key.clone(), d.clone());
                }
                probed
            }
        };
        match found {
            Some(d) => {
                log::info!("detect: {} backend at {}", d.flavor, d.base_url);
                *self.base_url.write().await = d.base_url.clone();
                *self.current.write().await = Some(d.clone());
                Some(d)
            }
            None => {
                log::warn!("detect: no known backend answered at {}", key);
                None
            }
        }
    }

    /// Current descriptor, or the configured URL treated as OpenAI-compatible.
    pub async fn resolve(&self) -> BackendDescriptor {
        match self.current().await {
            Some(d) => d,
            None => BackendDescriptor::new(BackendFlavor::OpenAiCompatible, self.base_url().await),
        }
    }

    async fn probe(&self, candidate: &str) -> Option<BackendDescriptor> {
        if let Some(flavor) = self.options.forced {
            return Some(forced_descriptor(flavor, candidate));
        }
        if let Some(d) = probe_hosted(candidate) {
            return Some(d);
        }
        if let Some(d) = self.probe_openai(candidate).await {
            return Some(d);
        }
        self.probe_ollama(candidate).await
    }

    async fn probe_openai(&self, candidate: &str) -> Option<BackendDescriptor> {
        let url = format!("{}/models", candidate);
        let mut req = self.http.get(&url);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let res = match req.send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                log::debug!("detect: {} answered {}", url, r.status());
                return None;
            }
            Err(e) => {
                log::debug!("detect: {} unreachable: {}", url, e);
                return None;
            }
        };
        let body: serde_json::Value = res.json().await.ok()?;
        parse_model_listing(&body)?;
        Some(BackendDescriptor::new(BackendFlavor::OpenAiCompatible, candidate))
    }

    async fn probe_ollama(&self, candidate: &str) -> Option<BackendDescriptor> {
        let root = with_port(candidate, self.options.ollama_port)?;
        let client = OllamaClient::new(root.clone()).with_timeout(self.options.probe_timeout);
        match client.list_models().await {
            Ok(_) => Some(BackendDescriptor::new(
                BackendFlavor::Ollama,
                format!("{}/v1", root),
            )),
            Err(e) => {
                log::debug!("detect: no ollama at {}: {}", root, e);
                None
            }
        }
    }
}

#[async_trait]
impl BackendConnector for BackendRegistry {
    async fn connect(&self) -> Arc<dyn LlmBackend> {
        let d = self.resolve().await;
        if d.requires_auth && self.api_key.is_none() {
            log::warn!("backend: {} needs an API key but none is configured", d.flavor);
        }
        Arc::new(
            OpenAiCompatClient::new(d.base_url, self.api_key.clone()).with_timeout(CHAT_TIMEOUT),
        )
    }
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Hostname match against known providers, rewriting the path to the canonical prefix when absent.
fn probe_hosted(candidate: &str) -> Option<BackendDescriptor> {
    let mut url = Url::parse(candidate).ok()?;
    let provider = HostedProvider::from_host(url.host_str()?)?;
    let prefix = provider.path_prefix();
    if !url.path().starts_with(prefix) {
        url.set_path(prefix);
    }
    Some(BackendDescriptor::new(
        BackendFlavor::Hosted(provider),
        url.as_str(),
    ))
}

fn forced_descriptor(flavor: BackendFlavor, candidate: &str) -> BackendDescriptor {
    match flavor {
        BackendFlavor::Hosted(_) => probe_hosted(candidate)
            .filter(|d| d.flavor == flavor)
            .unwrap_or_else(|| BackendDescriptor::new(flavor, candidate)),
        BackendFlavor::Ollama => BackendDescriptor::new(
            flavor,
            format!("{}/v1", crate::llm::server_root(candidate)),
        ),
        BackendFlavor::OpenAiCompatible => BackendDescriptor::new(flavor, candidate),
    }
}

/// `scheme://host:port` of the candidate with its port replaced.
fn with_port(candidate: &str, port: u16) -> Option<String> {
    let url = Url::parse(candidate).ok()?;
    Some(format!("{}://{}:{}", url.scheme(), url.host_str()?, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosted_probe_rewrites_missing_prefix() {
        let d = probe_hosted("https://api.groq.com").unwrap();
        assert_eq!(d.flavor, BackendFlavor::Hosted(HostedProvider::Groq));
        assert_eq!(d.base_url, "https://api.groq.com/openai/v1");
        assert!(d.requires_auth);

        let d = probe_hosted("https://api.openai.com/v1").unwrap();
        assert_eq!(d.base_url, "https://api.openai.com/v1");

        assert!(probe_hosted("http://127.0.0.1:1234/v1").is_none());
    }

    #[test]
    fn flavor_parses_config_names() {
        assert_eq!("ollama".parse::<BackendFlavor>().unwrap(), BackendFlavor::Ollama);
        assert_eq!(
            "OpenRouter".parse::<BackendFlavor>().unwrap(),
            BackendFlavor::Hosted(HostedProvider::OpenRouter)
        );
        assert_eq!(
            "openai-compatible".parse::<BackendFlavor>().unwrap(),
            BackendFlavor::OpenAiCompatible
        );
        assert!("vertex".parse::<BackendFlavor>().is_err());
    }

    #[test]
    fn ollama_probe_url_swaps_port() {
        assert_eq!(
            with_port("http://10.0.0.5:1234/v1", 11434).as_deref(),
            Some("http://10.0.0.5:11434")
        );
        assert_eq!(with_port("not a url", 11434), None);
    }

    #[test]
    fn forced_ollama_points_at_v1() {
        let d = forced_descriptor(BackendFlavor::Ollama, "http://127.0.0.1:11434");
        assert_eq!(d.base_url, "http://127.0.0.1:11434/v1");
        assert!(!d.requires_auth);
    }

    #[tokio::test]
    async fn forced_flavor_skips_probing_and_becomes_current() {
        let registry = BackendRegistry::new(
            "http://127.0.0.1:9/v1",
            None,
            DetectOptions {
                forced: Some(BackendFlavor::OpenAiCompatible),
                ..DetectOptions::default()
            },
        );
        let d = registry.detect_current().await.unwrap();
        assert_eq!(d.flavor, BackendFlavor::OpenAiCompatible);
        assert_eq!(registry.current().await, Some(d));
    }

    #[tokio::test]
    async fn set_base_url_clears_current() {
        let registry = BackendRegistry::new("https://api.openai.com", None, DetectOptions::default());
        registry.detect_current().await.unwrap();
        assert_eq!(registry.base_url().await, "https://api.openai.com/v1");

        registry.set_base_url("http://127.0.0.1:9/v1/").await;
        assert!(registry.current().await.is_none());
        assert_eq!(registry.base_url().await, "http://127.0.0.1:9/v1");
        let fallback = registry.resolve().await;
        assert_eq!(fallback.flavor, BackendFlavor::OpenAiCompatible);
        assert_eq!(fallback.base_url, "http://127.0.0.1:9/v1");
    }
}
