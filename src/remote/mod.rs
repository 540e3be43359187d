use async_trait::async_trait;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use crate::error::Result;
use crate::resolver::RequestPayload;
use std::fmt::Debug;

pub mod http;

/// 远程解析请求 (payload + 会话信息)
#[derive(Debug, Clone, Serialize)]
pub struct ResolveRequest {
    #[serde(skip)]
    pub uid: String,
    #[serde(flatten)]
    pub payload: RequestPayload,
    pub ws_channel: String,
    #[serde(skip)]
    pub session_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResolveResponse {
    /// The computation runs in the background; completion arrives on the push channel.
    Task { task_id: String },
    Value { value: Value },
}

/// The service that actually runs derived computations.
#[async_trait]
pub trait ExecutionService: Send + Sync + Debug {
    async fn resolve(&self, request: ResolveRequest) -> Result<ResolveResponse>;

    /// Best-effort cancellation of a running task.
    async fn cancel(&self, task_id: &str, session_token: Option<&str>) -> Result<()>;
}
