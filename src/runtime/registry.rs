use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use crate::remote::ExecutionService;
use crate::runtime::session::TokenProvider;
use crate::runtime::triggers::Trigger;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// A task started on behalf of a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEntry {
    pub task_id: String,
    /// Trigger to bump when the task is cancelled, forcing a fresh resolution
    pub trigger_key: Option<String>,
}

/// Told about tasks that were cancelled locally.
pub trait TaskListener: Send + Sync {
    fn task_cancelled(&self, task_id: &str);
}

#[derive(Debug, Default)]
struct RegistryState {
    running: HashSet<String>,
    // Ids that were registered and have since ended or been cancelled.
    finished: HashSet<String>,
    // Entries of finished tasks stay here; lookups filter by `running`.
    variable_tasks: HashMap<String, Vec<TaskEntry>>,
}

/// 会话级任务注册表：记录正在运行的远程任务，以及变量与任务的关联
pub struct TaskRegistry {
    state: Mutex<RegistryState>,
    service: Arc<dyn ExecutionService>,
    tokens: Arc<dyn TokenProvider>,
    trigger: Arc<dyn Trigger>,
    listeners: Mutex<Vec<Weak<dyn TaskListener>>>,
    // Runtime the registry was built on, for cancellations issued from sync code.
    runtime: Option<Handle>,
}

impl TaskRegistry {
    pub fn new(
        service: Arc<dyn ExecutionService>,
        tokens: Arc<dyn TokenProvider>,
        trigger: Arc<dyn Trigger>,
    ) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            service,
            tokens,
            trigger,
            listeners: Mutex::new(Vec::new()),
            runtime: Handle::try_current().ok(),
        }
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_listener(&self, listener: Weak<dyn TaskListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn start_task(&self, task_id: &str, variable_id: Option<&str>, trigger_key: Option<&str>) {
        let mut state = self.state();
        if let Some(variable_id) = variable_id {
            state
                .variable_tasks
                .entry(variable_id.to_string())
                .or_default()
                .push(TaskEntry {
                    task_id: task_id.to_string(),
                    trigger_key: trigger_key.map(str::to_string),
                });
        }
        state.finished.remove(task_id);
        state.running.insert(task_id.to_string());
        debug!(task_id, variable_id = ?variable_id, "Task started");
    }

    /// Marks a task finished. Unknown ids are ignored.
    pub fn end_task(&self, task_id: &str) {
        let mut state = self.state();
        if state.running.remove(task_id) {
            state.finished.insert(task_id.to_string());
            debug!(task_id, "Task ended");
        }
    }

    pub fn is_running(&self, task_id: &str) -> bool {
        self.state().running.contains(task_id)
    }

    /// True once a registered task has ended or been cancelled, until it is started again.
    pub fn has_finished(&self, task_id: &str) -> bool {
        self.state().finished.contains(task_id)
    }

    pub fn has_running_tasks(&self) -> bool {
        !self.state().running.is_empty()
    }

    /// Running task ids recorded against any of `variable_ids`, in registration order.
    pub fn get_variable_tasks(&self, variable_ids: &[&str]) -> Vec<String> {
        let state = self.state();
        let mut task_ids = Vec::new();
        for variable_id in variable_ids {
            let Some(entries) = state.variable_tasks.get(*variable_id) else {
                continue;
            };
            for entry in entries {
                if state.running.contains(&entry.task_id) && !task_ids.contains(&entry.task_id) {
                    task_ids.push(entry.task_id.clone());
                }
            }
        }
        task_ids
    }

    /// Cancels every running task of the given variables: requests remote cancellation,
    /// drops the id from the running set and bumps the entry's trigger.
    /// Returns the cancelled task ids.
    pub fn cleanup_running_tasks(&self, variable_ids: &[&str]) -> Vec<String> {
        let cancelled: Vec<TaskEntry> = {
            let mut state = self.state();
            let mut cancelled = Vec::new();
            for variable_id in variable_ids {
                let entries = state.variable_tasks.get(*variable_id).cloned().unwrap_or_default();
                for entry in entries {
                    if state.running.remove(&entry.task_id) {
                        state.finished.insert(entry.task_id.clone());
                        cancelled.push(entry);
                    }
                }
            }
            cancelled
        };

        for entry in &cancelled {
            info!(task_id = %entry.task_id, "Cancelling superseded task");
            self.cancel_remote(&entry.task_id);
            if let Some(key) = &entry.trigger_key {
                self.trigger.bump(key);
            }
            self.notify_cancelled(&entry.task_id);
        }

        cancelled.into_iter().map(|e| e.task_id).collect()
    }

    /// Cancels everything still running, including tasks started without a variable.
    pub fn cancel_all(&self) -> usize {
        let variable_ids: Vec<String> = self.state().variable_tasks.keys().cloned().collect();
        let refs: Vec<&str> = variable_ids.iter().map(String::as_str).collect();
        let mut count = self.cleanup_running_tasks(&refs).len();

        let orphans: Vec<String> = {
            let mut state = self.state();
            let orphans: Vec<String> = state.running.drain().collect();
            state.finished.extend(orphans.iter().cloned());
            orphans
        };
        for task_id in &orphans {
            self.cancel_remote(task_id);
            self.notify_cancelled(task_id);
        }
        count += orphans.len();
        count
    }

    // Fire and forget: local state is already clean whatever the service answers.
    fn cancel_remote(&self, task_id: &str) {
        let service = self.service.clone();
        let token = self.tokens.token();
        let task_id = task_id.to_string();

        match Handle::try_current().ok().or_else(|| self.runtime.clone()) {
            Some(handle) => {
                handle.spawn(async move {
                    if let Err(e) = service.cancel(&task_id, token.as_deref()).await {
                        warn!(task_id = %task_id, error = %e, "Remote task cancellation failed");
                    }
                });
            }
            None => {
                warn!(task_id = %task_id, "No async runtime, skipping remote task cancellation");
            }
        }
    }

    fn notify_cancelled(&self, task_id: &str) {
        let listeners: Vec<Arc<dyn TaskListener>> = {
            let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.task_cancelled(task_id);
        }
    }
}
