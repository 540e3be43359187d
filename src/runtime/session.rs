use std::sync::Arc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;
use crate::error::{ResolveError, Result};
use crate::remote::ExecutionService;
use crate::runtime::notify::{TaskNotification, TaskNotifier};
use crate::runtime::registry::TaskRegistry;
use crate::runtime::triggers::TriggerIndex;

/// Supplies the opaque session token passed along with remote calls.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// 会话：每个活动视图一个任务注册表
pub struct Session {
    pub ws_channel: String,
    pub registry: Arc<TaskRegistry>,
    pub notifier: Arc<TaskNotifier>,
    pub triggers: Arc<TriggerIndex>,
    pub tokens: Arc<dyn TokenProvider>,
}

impl Session {
    pub fn new(
        ws_channel: &str,
        service: Arc<dyn ExecutionService>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let triggers = Arc::new(TriggerIndex::new());
        let registry = Arc::new(TaskRegistry::new(service, tokens.clone(), triggers.clone()));
        let notifier = TaskNotifier::new(registry.clone());
        Self {
            ws_channel: ws_channel.to_string(),
            registry,
            notifier,
            triggers,
            tokens,
        }
    }

    /// Spawns the listener feeding push-channel messages into this session.
    pub fn listen(&self) -> mpsc::Sender<TaskNotification> {
        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(self.notifier.clone().run(rx));
        tx
    }
}

/// Creates one session per ws channel and tears it down on close.
pub struct SessionManager {
    service: Arc<dyn ExecutionService>,
    tokens: Arc<dyn TokenProvider>,
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionManager {
    pub fn new(service: Arc<dyn ExecutionService>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            service,
            tokens,
            sessions: DashMap::new(),
        }
    }

    pub fn open(&self) -> Arc<Session> {
        let ws_channel = Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(&ws_channel, self.service.clone(), self.tokens.clone()));
        self.sessions.insert(ws_channel.clone(), session.clone());
        info!(ws_channel = %ws_channel, "Session opened");
        session
    }

    pub fn get(&self, ws_channel: &str) -> Result<Arc<Session>> {
        self.sessions
            .get(ws_channel)
            .map(|s| s.value().clone())
            .ok_or_else(|| ResolveError::Configuration(format!("no active session for channel {}", ws_channel)))
    }

    /// Ends a session, cancelling whatever it still has running.
    pub fn close(&self, ws_channel: &str) -> Result<()> {
        let (_, session) = self.sessions.remove(ws_channel).ok_or_else(|| {
            ResolveError::Configuration(format!("no active session for channel {}", ws_channel))
        })?;
        let cancelled = session.registry.cancel_all();
        session.notifier.clear();
        info!(ws_channel = %ws_channel, cancelled, "Session closed");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
