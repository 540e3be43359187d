use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use serde::{Serialize, Deserialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace};
use crate::error::{ResolveError, Result};
use crate::runtime::registry::{TaskListener, TaskRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Complete,
    Error,
    #[serde(rename = "CANCELED")]
    Cancelled,
    Progress,
}

/// 推送通道上的任务状态消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNotification {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TaskNotification {
    pub fn complete(task_id: &str, result: Value) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: TaskStatus::Complete,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(task_id: &str, error: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: TaskStatus::Error,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

type Outcome = Result<Value>;

#[derive(Debug, Default)]
struct NotifierState {
    waiters: HashMap<String, oneshot::Sender<Outcome>>,
    // Outcomes that arrived before anyone subscribed.
    early: HashMap<String, Outcome>,
}

/// Routes task completions from the push channel to pending resolutions.
pub struct TaskNotifier {
    registry: Arc<TaskRegistry>,
    state: Mutex<NotifierState>,
}

impl std::fmt::Debug for TaskNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNotifier")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl TaskNotifier {
    pub fn new(registry: Arc<TaskRegistry>) -> Arc<Self> {
        let notifier = Arc::new(Self {
            registry: registry.clone(),
            state: Mutex::new(NotifierState::default()),
        });
        let listener: Arc<dyn TaskListener> = notifier.clone();
        registry.add_listener(Arc::downgrade(&listener));
        notifier
    }

    fn state(&self) -> MutexGuard<'_, NotifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for the outcome of `task_id`. Resolves to `Stale` if the task is cancelled locally.
    pub fn subscribe(&self, task_id: &str) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state();
        match state.early.remove(task_id) {
            Some(outcome) => {
                // The outcome may have arrived before the task was registered.
                self.registry.end_task(task_id);
                let _ = tx.send(outcome);
            }
            None => {
                state.waiters.insert(task_id.to_string(), tx);
            }
        }
        rx
    }

    /// Applies one push-channel message. Returns false when the message was ignored,
    /// either because it only reports progress or because the task already ended.
    /// Outcomes for ids the registry has not seen yet are held for the next subscriber.
    pub fn deliver(&self, notification: TaskNotification) -> bool {
        let task_id = notification.task_id;

        let outcome = match notification.status {
            TaskStatus::Progress => {
                trace!(task_id = %task_id, "Task progress");
                return false;
            }
            TaskStatus::Complete => Ok(notification.result.unwrap_or(Value::Null)),
            TaskStatus::Error => Err(ResolveError::TaskFailed {
                task_id: task_id.clone(),
                message: notification.error.unwrap_or_else(|| "unknown error".to_string()),
            }),
            TaskStatus::Cancelled => Err(ResolveError::TaskCancelled {
                task_id: task_id.clone(),
            }),
        };

        // Held across the registry check so a concurrent subscribe sees the parked outcome.
        let mut state = self.state();
        if self.registry.is_running(&task_id) {
            self.registry.end_task(&task_id);
        } else if self.registry.has_finished(&task_id) {
            debug!(task_id = %task_id, "Discarding notification for a task that is not running");
            return false;
        } else {
            debug!(task_id = %task_id, "Holding notification for a task not registered yet");
        }

        match state.waiters.remove(&task_id) {
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => {
                state.early.insert(task_id, outcome);
            }
        }
        true
    }

    /// Number of outcomes waiting for a subscriber.
    pub fn parked(&self) -> usize {
        self.state().early.len()
    }

    /// Drops every waiter and parked outcome. Waiters reject as stale.
    pub fn clear(&self) {
        let mut state = self.state();
        state.waiters.clear();
        state.early.clear();
    }

    /// Drains the push channel until it closes.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<TaskNotification>) {
        info!("Task notification listener started.");
        while let Some(notification) = rx.recv().await {
            self.deliver(notification);
        }
        info!("Task notification channel closed.");
    }
}

impl TaskListener for TaskNotifier {
    fn task_cancelled(&self, task_id: &str) {
        let mut state = self.state();
        // Dropping the sender wakes the waiter with a closed channel.
        state.waiters.remove(task_id);
        state.early.remove(task_id);
    }
}
