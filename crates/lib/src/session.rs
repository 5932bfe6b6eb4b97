//! Session store: one orchestrator per session id, bound to a model.
//!
//! Resolving a session with a different model replaces its orchestrator (and so its
//! conversation). Sessions idle past the timeout are removed by a periodic sweep.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::orchestrator::{Orchestrator, OrchestratorFactory};

/// Unique session identifier (opaque string).
pub type SessionId = String;

struct SessionEntry {
    orchestrator: Arc<Mutex<Orchestrator>>,
    model: String,
    last_active: Instant,
}

/// What `get` hands back: the resolved id, its bound model and the orchestrator. Locking the
/// orchestrator serializes requests for the same session.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub model: String,
    pub orchestrator: Arc<Mutex<Orchestrator>>,
}

pub struct SessionStore {
    inner: Arc<RwLock<HashMap<SessionId, SessionEntry>>>,
    factory: Arc<OrchestratorFactory>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(factory: Arc<OrchestratorFactory>, idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            factory,
            idle_timeout,
        }
    }

    /// Resolve a session, creating it when the id is absent or unknown. A model different from
    /// the bound one replaces the orchestrator. `None` model keeps the bound model (or the
    /// factory default for a new session).
    pub async fn get(&self, id: Option<&str>, model: Option<&str>) -> SessionHandle {
        let id = match id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => format!("sess-{}", uuid::Uuid::new_v4()),
        };
        let requested = model.map(str::trim).filter(|s| !s.is_empty());

        let mut g = self.inner.write().await;
        let now = Instant::now();
        if let Some(entry) = g.get_mut(&id) {
            if requested.map_or(true, |m| m == entry.model) {
                entry.last_active = now;
                return SessionHandle {
                    id,
                    model: entry.model.clone(),
                    orchestrator: Arc::clone(&entry.orchestrator),
                };
            }
        }

        let model = requested.unwrap_or(self.factory.default_model()).to_string();
        let orchestrator = Arc::new(Mutex::new(self.factory.build(&model).await));
        let previous = g.insert(
            id.clone(),
            SessionEntry {
                orchestrator: Arc::clone(&orchestrator),
                model: model.clone(),
                last_active: now,
            },
        );
        match previous {
            Some(old) => log::info!(
                "session: {} switched model {} -> {}, conversation reset",
                id,
                old.model,
                model
            ),
            None => log::debug!("session: created {} with model {}", id, model),
        }
        SessionHandle {
            id,
            model,
            orchestrator,
        }
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Remove sessions idle longer than the timeout. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut g = self.inner.write().await;
        let before = g.len();
        g.retain(|id, entry| {
            let keep = now.duration_since(entry.last_active) <= self.idle_timeout;
            if !keep {
                log::info!("session: evicted idle session {}", id);
            }
            keep
        });
        before - g.len()
    }

    /// Run `sweep` every `every` until the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let removed = store.sweep().await;
                if removed > 0 {
                    log::debug!("session: sweep removed {} session(s)", removed);
                }
            }
        })
    }
}
