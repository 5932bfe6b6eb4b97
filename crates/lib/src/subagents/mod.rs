//! Specialized sub-agents the orchestrator can route a request to instead of the model.

mod file;
mod web;

use async_trait::async_trait;

pub use file::FileAgent;
pub use web::WebAgent;

/// Handles one raw request and returns reply text. Errors are turned into an apology by the
/// orchestrator; they never reach the user as-is.
#[async_trait]
pub trait SubAgent: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle_request(&self, raw: &str) -> anyhow::Result<String>;
}
