use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use crate::error::{ResolveError, Result};
use crate::remote::{ExecutionService, ResolveRequest, ResolveResponse};
use crate::resolver::payload::build_request_payload_with;
use crate::resolver::{resolve_display, significant_deps, ResolvedValue, ValueSource};
use crate::runtime::cache::{CachedResult, ResultCache};
use crate::runtime::notify::TaskNotifier;
use crate::runtime::registry::TaskRegistry;
use crate::runtime::session::Session;
use crate::runtime::triggers::{trigger_key, Trigger, TriggerIndex};
use crate::variables::Variable;

pub enum Resolution {
    /// Display form, computed locally without any remote activity
    Ready(ResolvedValue),
    Pending(PendingValue),
}

/// Handle on a remote resolution. Resolves with the value, or, for derived data
/// variables, with the rows followed by a `{cache_key, filters, ws_channel}` record.
pub struct PendingValue {
    variable_id: String,
    cache_key: String,
    future: BoxFuture<'static, Result<Value>>,
}

impl PendingValue {
    pub fn variable_id(&self) -> &str {
        &self.variable_id
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }
}

impl Future for PendingValue {
    type Output = Result<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().future.as_mut().poll(cx)
    }
}

/// 解析调度器：决定本地解析还是交给远程执行服务
pub struct Dispatcher {
    session: Arc<Session>,
    service: Arc<dyn ExecutionService>,
    cache: Arc<dyn ResultCache>,
    values: Arc<dyn ValueSource>,
    // Significant deps seen at the last dispatch of each variable
    last_deps: DashMap<String, Vec<Value>>,
}

impl Dispatcher {
    pub fn new(
        session: Arc<Session>,
        service: Arc<dyn ExecutionService>,
        cache: Arc<dyn ResultCache>,
        values: Arc<dyn ValueSource>,
    ) -> Self {
        Self {
            session,
            service,
            cache,
            values,
            last_deps: DashMap::new(),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn resolve(&self, variable: &Variable, fetch: bool) -> Result<Resolution> {
        if !fetch || variable.as_derived().is_none() {
            return Ok(Resolution::Ready(resolve_display(variable, self.values.as_ref())?));
        }
        Ok(Resolution::Pending(self.dispatch(variable, false)?))
    }

    /// Invalidates the variable's trigger and resolves again, bypassing the cache.
    pub fn refresh(&self, variable: &Variable) -> Result<PendingValue> {
        self.session.triggers.bump(&trigger_key(variable.uid()));
        self.dispatch(variable, true)
    }

    fn dispatch(&self, variable: &Variable, force: bool) -> Result<PendingValue> {
        let payload = build_request_payload_with(variable, self.values.as_ref(), force)?;
        let cache_key = payload.cache_key()?;
        self.supersede(variable);

        let uid = variable.uid().to_string();
        let fetch = Fetch {
            registry: self.session.registry.clone(),
            notifier: self.session.notifier.clone(),
            triggers: self.session.triggers.clone(),
            service: self.service.clone(),
            cache: self.cache.clone(),
            trigger_key: trigger_key(&uid),
            cache_key: cache_key.clone(),
            request: ResolveRequest {
                uid: uid.clone(),
                payload,
                ws_channel: self.session.ws_channel.clone(),
                session_token: self.session.tokens.token(),
            },
        };

        Ok(PendingValue {
            variable_id: uid,
            cache_key,
            future: Box::pin(fetch.run()),
        })
    }

    // Tasks started for an older set of significant deps can never be current again.
    fn supersede(&self, variable: &Variable) {
        let uid = variable.uid();
        let deps = significant_deps(variable, self.values.as_ref());
        let changed = match self.last_deps.insert(uid.to_string(), deps.clone()) {
            Some(previous) => previous != deps,
            None => false,
        };

        if changed {
            let cancelled = self.session.registry.cleanup_running_tasks(&[uid]);
            if !cancelled.is_empty() {
                info!(variable_id = %uid, ?cancelled, "Dependencies changed, cancelled running tasks");
            }
        }
    }
}

struct Fetch {
    registry: Arc<TaskRegistry>,
    notifier: Arc<TaskNotifier>,
    triggers: Arc<TriggerIndex>,
    service: Arc<dyn ExecutionService>,
    cache: Arc<dyn ResultCache>,
    trigger_key: String,
    cache_key: String,
    request: ResolveRequest,
}

impl Fetch {
    async fn run(self) -> Result<Value> {
        let uid = self.request.uid.clone();
        let generation = self.triggers.current(&self.trigger_key);

        if !self.request.payload.force {
            if let Some(hit) = self.cached(generation).await {
                debug!(variable_id = %uid, "Cache hit");
                return self.finish(hit);
            }
        }

        let response = self.service.resolve(self.request.clone()).await?;
        let value = match response {
            ResolveResponse::Value { value } => value,
            ResolveResponse::Task { task_id } => {
                self.registry.start_task(&task_id, Some(uid.as_str()), Some(self.trigger_key.as_str()));
                let rx = self.notifier.subscribe(&task_id);
                info!(variable_id = %uid, task_id = %task_id, "Waiting for task");
                match rx.await {
                    Ok(outcome) => outcome?,
                    Err(_) => return Err(ResolveError::Stale { task_id }),
                }
            }
        };

        self.store(generation, &value).await;
        self.finish(value)
    }

    // Cache problems degrade to a miss; the remote service stays authoritative.
    async fn cached(&self, generation: u64) -> Option<Value> {
        match self.cache.get(&self.cache_key).await {
            Ok(Some(entry)) if entry.generation == generation => Some(entry.value),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read result cache");
                None
            }
        }
    }

    async fn store(&self, generation: u64, value: &Value) {
        let entry = CachedResult {
            generation,
            value: value.clone(),
        };
        if let Err(e) = self.cache.set(&self.cache_key, entry).await {
            warn!(error = %e, "Failed to write result cache");
        }
    }

    fn finish(&self, value: Value) -> Result<Value> {
        let payload = &self.request.payload;
        if !payload.is_data_variable {
            return Ok(value);
        }

        let mut rows = match value {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            other => {
                return Err(ResolveError::Remote(format!(
                    "expected rows for data variable {}, got {}",
                    self.request.uid, other
                )));
            }
        };
        rows.push(json!({
            "cache_key": self.cache_key,
            "filters": payload.filters.clone().unwrap_or(Value::Null),
            "ws_channel": self.request.ws_channel,
        }));
        Ok(Value::Array(rows))
    }
}
