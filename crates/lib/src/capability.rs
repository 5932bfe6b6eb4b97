//! Runtime-learned capability flags: does a model accept native tool calls.
//!
//! Shared by every conversation in the process; never persisted.

use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolSupport {
    /// Not learned yet: try native tool calling first.
    #[default]
    Unknown,
    Supported,
    /// Skip the native attempt and describe tools in the system message instead.
    Unsupported,
}

#[derive(Default)]
pub struct CapabilityRegistry {
    inner: RwLock<HashMap<String, ToolSupport>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, model: &str) -> ToolSupport {
        self.inner
            .read()
            .await
            .get(model)
            .copied()
            .unwrap_or_default()
    }

    pub async fn set(&self, model: &str, support: ToolSupport) {
        let previous = self.inner.write().await.insert(model.to_string(), support);
        if previous != Some(support) {
            log::debug!("capability: {} tool support -> {:?}", model, support);
        }
    }
}
