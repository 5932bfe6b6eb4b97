//! Initialize the configuration directory: create ~/.parley, a default config and the workspace.
//!
//! `config/workspace/AGENTS.md` in this crate seeds `~/.parley/workspace/AGENTS.md`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config;

static DEFAULT_AGENT_CTX: &str = include_str!("../config/workspace/AGENTS.md");

/// Fail with a hint to run `parley init` when the config file does not exist.
pub fn require_initialized(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        anyhow::bail!(
            "configuration not initialized; run `parley init` first (config file not found: {})",
            config_path.display()
        );
    }
    Ok(())
}

/// Create the config directory and default files if they do not exist.
/// - Writes `config.json` with `{}` if missing.
/// - Creates the workspace (configured or `<config dir>/workspace`) and seeds `AGENTS.md`.
///
/// Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        std::fs::write(config_path, b"{}")
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    let (cfg, _) = config::load_config(Some(config_path.to_path_buf()))?;
    let workspace = cfg
        .agents
        .workspace
        .clone()
        .unwrap_or_else(|| config_dir.join("workspace"));
    if !workspace.exists() {
        std::fs::create_dir_all(&workspace)
            .with_context(|| format!("creating workspace directory {}", workspace.display()))?;
        log::info!("created workspace directory at {}", workspace.display());
    }
    let workspace_agents = workspace.join("AGENTS.md");
    if !workspace_agents.exists() {
        std::fs::write(&workspace_agents, DEFAULT_AGENT_CTX)
            .with_context(|| format!("writing default AGENTS.md to {}", workspace_agents.display()))?;
        log::info!("wrote default AGENTS.md to {}", workspace_agents.display());
    } else {
        log::debug!("AGENTS.md already exists at {}, skipping", workspace_agents.display());
    }

    Ok(config_dir.to_path_buf())
}
