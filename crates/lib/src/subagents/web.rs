//! Web sub-agent: fetch the first URL in the request and return its text.

use std::sync::Arc;

use async_trait::async_trait;

use super::SubAgent;
use crate::tools::{find_url, ToolBox};

const HELP: &str = "Give me a link to open, e.g. `/web https://example.com`.";

pub struct WebAgent {
    tools: Arc<ToolBox>,
}

impl WebAgent {
    pub fn new(tools: Arc<ToolBox>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl SubAgent for WebAgent {
    fn name(&self) -> &'static str {
        "web"
    }

    async fn handle_request(&self, raw: &str) -> anyhow::Result<String> {
        let Some(url) = find_url(raw) else {
            return Ok(HELP.to_string());
        };
        log::debug!("web: fetching {}", url);
        let text = self.tools.fetch_url(url).await?;
        if text.trim().is_empty() {
            return Ok(format!("{} returned no readable text.", url));
        }
        Ok(text)
    }
}
