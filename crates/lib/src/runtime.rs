//! Process wiring: detect the backend once, build the orchestrator factory and session store,
//! and run the idle sweeper until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use crate::agent_ctx;
use crate::backend::{BackendDescriptor, BackendRegistry, ModelCatalog, ModelInfo};
use crate::capability::CapabilityRegistry;
use crate::config::{self, Config};
use crate::downloads::DownloadStore;
use crate::orchestrator::{OrchestratorFactory, Route};
use crate::session::{SessionHandle, SessionStore};
use crate::subagents::{FileAgent, WebAgent};
use crate::tools::{ToolBox, Workspace};

/// Model name used when neither config nor the catalog names one.
pub const FALLBACK_MODEL: &str = "default";

const CATALOG_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Runtime {
    config: Config,
    backends: Arc<BackendRegistry>,
    catalog: ModelCatalog,
    capabilities: Arc<CapabilityRegistry>,
    downloads: Arc<DownloadStore>,
    sessions: Arc<SessionStore>,
    sweeper: JoinHandle<()>,
}

impl Runtime {
    pub async fn start(config: Config) -> Result<Self> {
        let backends = Arc::new(BackendRegistry::from_config(&config));
        Self::start_with(config, backends).await
    }

    /// Start with an already-built registry (tests point it at a fake server).
    pub async fn start_with(config: Config, backends: Arc<BackendRegistry>) -> Result<Self> {
        if backends.detect_current().await.is_none() {
            log::warn!(
                "runtime: backend not detected, using {} as openai-compatible",
                backends.base_url().await
            );
        }
        let catalog = ModelCatalog::new(backends.api_key().map(str::to_string), CATALOG_TIMEOUT);

        let default_model = match config.agents.default_model.clone() {
            Some(m) if !m.trim().is_empty() => m,
            _ => {
                let d = backends.resolve().await;
                catalog
                    .list_models(&d.base_url, d.flavor)
                    .await
                    .into_iter()
                    .next()
                    .map(|m| m.id)
                    .unwrap_or_else(|| FALLBACK_MODEL.to_string())
            }
        };
        log::info!("runtime: default model {}", default_model);

        let workspace_dir = config::resolve_workspace_dir(&config);
        tokio::fs::create_dir_all(&workspace_dir)
            .await
            .with_context(|| format!("creating workspace directory {}", workspace_dir.display()))?;
        let system_prompt =
            agent_ctx::load_system_prompt(&workspace_dir, config.agents.system_prompt.as_deref());

        let capabilities = Arc::new(CapabilityRegistry::new());
        let downloads = Arc::new(DownloadStore::new());
        let tools = Arc::new(ToolBox::new(
            Workspace::new(workspace_dir),
            Arc::clone(&downloads),
            config.agents.tool_timeout(),
        ));
        let factory = OrchestratorFactory::new(
            backends.clone(),
            Arc::clone(&capabilities),
            tools.clone(),
            Arc::new(FileAgent::new(tools.clone())),
            Arc::new(WebAgent::new(tools)),
            default_model,
        )
        .with_system_prompt(system_prompt)
        .with_max_rounds(config.agents.max_tool_rounds());

        let sessions = Arc::new(SessionStore::new(
            Arc::new(factory),
            config.sessions.idle_timeout(),
        ));
        let sweeper = sessions.spawn_sweeper(config.sessions.sweep_interval());

        Ok(Self {
            config,
            backends,
            catalog,
            capabilities,
            downloads,
            sessions,
            sweeper,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backends(&self) -> &Arc<BackendRegistry> {
        &self.backends
    }

    pub fn capabilities(&self) -> &Arc<CapabilityRegistry> {
        &self.capabilities
    }

    pub fn downloads(&self) -> &Arc<DownloadStore> {
        &self.downloads
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub async fn descriptor(&self) -> BackendDescriptor {
        self.backends.resolve().await
    }

    pub async fn list_models(&self) -> Vec<ModelInfo> {
        let d = self.descriptor().await;
        self.catalog.list_models(&d.base_url, d.flavor).await
    }

    /// One request against a session (created when `session` is None or unknown).
    pub async fn ask(
        &self,
        session: Option<&str>,
        model: Option<&str>,
        text: &str,
        hint: Option<Route>,
    ) -> (SessionHandle, Option<String>) {
        let handle = self.sessions.get(session, model).await;
        let reply = handle
            .orchestrator
            .lock()
            .await
            .send_message(text, hint)
            .await;
        (handle, reply)
    }

    pub fn shutdown(self) {
        self.sweeper.abort();
    }
}
