//! Router/orchestrator: classify each request, dispatch it to the model engine or a sub-agent,
//! and keep an in-memory interaction log.
//!
//! Nothing raised below this layer reaches the caller: sub-agent errors and panics anywhere in
//! dispatch become [`APOLOGY`].

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use regex::Regex;

use crate::agent::ChatAgent;
use crate::backend::BackendConnector;
use crate::capability::CapabilityRegistry;
use crate::config::DEFAULT_MAX_TOOL_ROUNDS;
use crate::llm::MessageContent;
use crate::subagents::SubAgent;
use crate::tools::ToolExecutor;

pub const APOLOGY: &str = "Sorry, something went wrong while handling that request. Please try again.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the available tools when they help answer the user's request, and answer directly otherwise.";

const WEB_PREFIX: &str = "/web";
const FILE_PREFIX: &str = "/file";

/// Phrases that send plain text to the web sub-agent.
const WEB_TRIGGERS: &[&str] = &[
    "search the web",
    "search online",
    "look it up online",
    "browse to",
    "open the link",
    "open the url",
    "open this link",
    "fetch the page",
    "fetch this page",
    "visit the site",
    "visit this site",
    "what does this page say",
];

fn file_intent_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:read|open|show|list|display)\b.{0,40}?\b(?:files?|documents?)\b")
            .expect("valid file intent pattern")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Model,
    File,
    Web,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Route::Model => "model",
            Route::File => "file",
            Route::Web => "web",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub route: Route,
    pub direction: Direction,
    pub text: String,
}

/// Pick a route for input with no hint. Web intent is checked before file intent; structured
/// input always goes to the model.
pub fn classify(content: &MessageContent) -> Route {
    let Some(text) = content.as_text() else {
        return Route::Model;
    };
    let text = text.trim();
    let lower = text.to_lowercase();
    if has_command_prefix(text, WEB_PREFIX) || WEB_TRIGGERS.iter().any(|t| lower.contains(t)) {
        return Route::Web;
    }
    if has_command_prefix(text, FILE_PREFIX) || file_intent_regex().is_match(text) {
        return Route::File;
    }
    Route::Model
}

fn has_command_prefix(text: &str, prefix: &str) -> bool {
    text.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

pub struct Orchestrator {
    engine: ChatAgent,
    file_agent: Arc<dyn SubAgent>,
    web_agent: Arc<dyn SubAgent>,
    log: Vec<LogEntry>,
}

impl Orchestrator {
    pub fn new(engine: ChatAgent, file_agent: Arc<dyn SubAgent>, web_agent: Arc<dyn SubAgent>) -> Self {
        Self {
            engine,
            file_agent,
            web_agent,
            log: Vec::new(),
        }
    }

    pub fn model(&self) -> &str {
        self.engine.model()
    }

    pub fn engine(&self) -> &ChatAgent {
        &self.engine
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Handle one request. `hint` overrides classification for text input. Returns None when
    /// the input was blank or the model produced no reply.
    pub async fn send_message(
        &mut self,
        input: impl Into<MessageContent>,
        hint: Option<Route>,
    ) -> Option<String> {
        let content = input.into();
        let route = match (content.as_text(), hint) {
            (None, _) => Route::Model,
            (Some(_), Some(route)) => route,
            (Some(_), None) => classify(&content),
        };
        self.record(route, Direction::Inbound, content.to_plain_text());
        log::debug!("orchestrator: routing request to {}", route);

        let reply = match AssertUnwindSafe(self.dispatch(route, content))
            .catch_unwind()
            .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                log::error!("orchestrator: {} route failed: {:#}", route, e);
                Some(APOLOGY.to_string())
            }
            Err(_) => {
                log::error!("orchestrator: {} route panicked", route);
                Some(APOLOGY.to_string())
            }
        };

        if let Some(text) = reply.as_deref().filter(|t| !t.trim().is_empty()) {
            self.record(route, Direction::Outbound, text.to_string());
        }
        reply
    }

    async fn dispatch(
        &mut self,
        route: Route,
        content: MessageContent,
    ) -> anyhow::Result<Option<String>> {
        let agent = match route {
            Route::Model => return Ok(self.engine.send_message(content).await),
            Route::File => &self.file_agent,
            Route::Web => &self.web_agent,
        };
        log::debug!("orchestrator: {} agent handling request", agent.name());
        let reply = agent.handle_request(&content.to_plain_text()).await?;
        Ok(Some(reply).filter(|r| !r.trim().is_empty()))
    }

    /// Reset the conversation and clear the interaction log.
    pub fn reset(&mut self) {
        self.engine.reset_context();
        self.log.clear();
    }

    /// Replace the system prompt; this also resets the conversation.
    pub fn set_system_prompt(&mut self, text: impl Into<String>) {
        self.engine.set_system_prompt(text);
    }

    fn record(&mut self, route: Route, direction: Direction, text: String) {
        self.log.push(LogEntry {
            at: Utc::now(),
            route,
            direction,
            text,
        });
    }
}

/// Builds a fresh orchestrator (new engine, empty history) for a session.
pub struct OrchestratorFactory {
    connector: Arc<dyn BackendConnector>,
    capabilities: Arc<CapabilityRegistry>,
    tools: Arc<dyn ToolExecutor>,
    file_agent: Arc<dyn SubAgent>,
    web_agent: Arc<dyn SubAgent>,
    system_prompt: String,
    default_model: String,
    max_rounds: usize,
}

impl OrchestratorFactory {
    pub fn new(
        connector: Arc<dyn BackendConnector>,
        capabilities: Arc<CapabilityRegistry>,
        tools: Arc<dyn ToolExecutor>,
        file_agent: Arc<dyn SubAgent>,
        web_agent: Arc<dyn SubAgent>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            capabilities,
            tools,
            file_agent,
            web_agent,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            default_model: default_model.into(),
            max_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_rounds(mut self, max: usize) -> Self {
        self.max_rounds = max;
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub async fn build(&self, model: &str) -> Orchestrator {
        let backend = self.connector.connect().await;
        let engine = ChatAgent::new(
            backend,
            model,
            self.system_prompt.clone(),
            Arc::clone(&self.capabilities),
            Arc::clone(&self.tools),
        )
        .with_max_rounds(self.max_rounds);
        Orchestrator::new(
            engine,
            Arc::clone(&self.file_agent),
            Arc::clone(&self.web_agent),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ContentPart, ImageUrl};
    use crate::test_support::{text, EchoTools, FixedConnector, ScriptedBackend};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SubAgent for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn handle_request(&self, raw: &str) -> anyhow::Result<String> {
            self.seen.lock().unwrap().push(raw.to_string());
            Ok(format!("handled: {}", raw))
        }
    }

    struct Failing;

    #[async_trait]
    impl SubAgent for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn handle_request(&self, _raw: &str) -> anyhow::Result<String> {
            anyhow::bail!("disk on fire at /var/secret")
        }
    }

    struct Panicking;

    #[async_trait]
    impl SubAgent for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn handle_request(&self, _raw: &str) -> anyhow::Result<String> {
            panic!("index out of bounds")
        }
    }

    fn orchestrator(
        backend: Arc<ScriptedBackend>,
        file: Arc<dyn SubAgent>,
        web: Arc<dyn SubAgent>,
    ) -> Orchestrator {
        let engine = ChatAgent::new(
            backend,
            "m",
            "sys",
            Arc::new(CapabilityRegistry::new()),
            Arc::new(EchoTools),
        );
        Orchestrator::new(engine, file, web)
    }

    #[test]
    fn classifies_web_before_file() {
        let t = |s: &str| classify(&MessageContent::from(s));
        assert_eq!(t("/web https://example.com"), Route::Web);
        assert_eq!(t("please search the web for rust news"), Route::Web);
        assert_eq!(t("Open the link and read the file it mentions"), Route::Web);
        assert_eq!(t("/file list"), Route::File);
        assert_eq!(t("can you read the file notes.txt"), Route::File);
        assert_eq!(t("show me that document"), Route::File);
        assert_eq!(t("/website ideas"), Route::Model);
        assert_eq!(t("what is a file descriptor?"), Route::Model);
        assert_eq!(t("hola"), Route::Model);
    }

    #[tokio::test]
    async fn routes_to_sub_agents_and_logs_both_directions() {
        let files = Arc::new(Recording::default());
        let backend = Arc::new(ScriptedBackend::new());
        let mut orch = orchestrator(backend.clone(), files.clone(), Arc::new(Recording::default()));

        let reply = orch.send_message("/file read a.txt", None).await;
        assert_eq!(reply.as_deref(), Some("handled: /file read a.txt"));
        assert_eq!(files.seen.lock().unwrap().len(), 1);
        assert!(backend.calls().is_empty());

        let log = orch.log();
        assert_eq!(log.len(), 2);
        assert_eq!((log[0].route, log[0].direction), (Route::File, Direction::Inbound));
        assert_eq!((log[1].route, log[1].direction), (Route::File, Direction::Outbound));
    }

    #[tokio::test]
    async fn hint_overrides_classification() {
        let web = Arc::new(Recording::default());
        let backend = Arc::new(ScriptedBackend::new().then(Ok(text("model says hi"))));
        let mut orch = orchestrator(backend.clone(), Arc::new(Recording::default()), web.clone());

        orch.send_message("hello there", Some(Route::Web)).await;
        assert_eq!(web.seen.lock().unwrap().as_slice(), ["hello there"]);
        let reply = orch.send_message("/web https://x.y", Some(Route::Model)).await;
        assert_eq!(reply.as_deref(), Some("model says hi"));
    }

    #[tokio::test]
    async fn structured_input_always_goes_to_model() {
        let web = Arc::new(Recording::default());
        let backend = Arc::new(ScriptedBackend::new().then(Ok(text("a diagram"))));
        let mut orch = orchestrator(backend.clone(), Arc::new(Recording::default()), web.clone());

        let content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: "/web https://example.com".to_string(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "data:image/png;base64,AAAA".to_string(),
                },
            },
        ]);
        let reply = orch.send_message(content, Some(Route::Web)).await;
        assert_eq!(reply.as_deref(), Some("a diagram"));
        assert!(web.seen.lock().unwrap().is_empty());
        assert_eq!(orch.log()[0].route, Route::Model);
    }

    #[tokio::test]
    async fn sub_agent_errors_and_panics_become_apology() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut orch = orchestrator(backend, Arc::new(Failing), Arc::new(Panicking));

        let reply = orch.send_message("/file read x", None).await;
        assert_eq!(reply.as_deref(), Some(APOLOGY));
        let reply = orch.send_message("/web https://example.com", None).await;
        assert_eq!(reply.as_deref(), Some(APOLOGY));
        assert!(orch.log().iter().all(|e| !e.text.contains("/var/secret")));
    }

    #[tokio::test]
    async fn engine_panic_becomes_apology() {
        let backend = Arc::new(ScriptedBackend::new().with_fallback(|_| panic!("decoder bug")));
        let mut orch = orchestrator(
            backend,
            Arc::new(Recording::default()),
            Arc::new(Recording::default()),
        );

        assert_eq!(orch.send_message("hola", None).await.as_deref(), Some(APOLOGY));
        let last = orch.log().last().unwrap();
        assert_eq!((last.route, last.direction), (Route::Model, Direction::Outbound));
    }

    #[tokio::test]
    async fn reset_clears_log_and_history() {
        let backend = Arc::new(ScriptedBackend::new().then(Ok(text("hi"))));
        let mut orch = orchestrator(
            backend,
            Arc::new(Recording::default()),
            Arc::new(Recording::default()),
        );
        orch.send_message("hola", None).await;
        assert_eq!(orch.engine().messages().len(), 3);

        orch.reset();
        assert!(orch.log().is_empty());
        assert_eq!(orch.engine().messages().len(), 1);
    }

    #[tokio::test]
    async fn failed_model_reply_is_logged_inbound_only() {
        let backend = Arc::new(ScriptedBackend::new().then(Err(crate::llm::LlmError::Decode(
            "bad json".to_string(),
        ))));
        let mut orch = orchestrator(
            backend,
            Arc::new(Recording::default()),
            Arc::new(Recording::default()),
        );
        assert_eq!(orch.send_message("hola", None).await, None);
        assert_eq!(orch.log().len(), 1);
    }

    #[tokio::test]
    async fn factory_builds_independent_orchestrators() {
        let backend = Arc::new(ScriptedBackend::new().with_fallback(|_| Ok(text("ok"))));
        let factory = OrchestratorFactory::new(
            Arc::new(FixedConnector(backend.clone())),
            Arc::new(CapabilityRegistry::new()),
            Arc::new(EchoTools),
            Arc::new(Recording::default()),
            Arc::new(Recording::default()),
            "default-model",
        )
        .with_system_prompt("Be brief.");

        let mut a = factory.build("model-a").await;
        let b = factory.build(factory.default_model()).await;
        a.send_message("hi", None).await;
        assert_eq!(a.model(), "model-a");
        assert_eq!(b.model(), "default-model");
        assert_eq!(a.engine().messages().len(), 3);
        assert_eq!(b.engine().messages().len(), 1);
        assert_eq!(b.engine().system_prompt(), "Be brief.");
        assert_eq!(backend.calls()[0].model, "model-a");
    }
}
