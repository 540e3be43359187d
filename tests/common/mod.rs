#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use varflow::error::{ResolveError, Result};
use varflow::remote::{ExecutionService, ResolveRequest, ResolveResponse};

/// In-process execution service answering from a script and recording every call.
#[derive(Debug, Default)]
pub struct ScriptedService {
    responses: Mutex<VecDeque<Result<ResolveResponse>>>,
    pub requests: Mutex<Vec<ResolveRequest>>,
    pub cancelled: Mutex<Vec<(String, Option<String>)>>,
    pub fail_cancel: bool,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_cancel() -> Self {
        Self {
            fail_cancel: true,
            ..Self::default()
        }
    }

    pub fn push(&self, response: Result<ResolveResponse>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn push_value(&self, value: serde_json::Value) {
        self.push(Ok(ResolveResponse::Value { value }));
    }

    pub fn push_task(&self, task_id: &str) {
        self.push(Ok(ResolveResponse::Task { task_id: task_id.to_string() }));
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn cancelled_ids(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }
}

#[async_trait]
impl ExecutionService for ScriptedService {
    async fn resolve(&self, request: ResolveRequest) -> Result<ResolveResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ResolveError::Remote("no scripted response".to_string())))
    }

    async fn cancel(&self, task_id: &str, session_token: Option<&str>) -> Result<()> {
        self.cancelled
            .lock()
            .unwrap()
            .push((task_id.to_string(), session_token.map(str::to_string)));
        if self.fail_cancel {
            return Err(ResolveError::Remote("cancel endpoint unreachable".to_string()));
        }
        Ok(())
    }
}

/// Polls `condition` until it holds, panicking after roughly two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}
