use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// A session-scoped component was used without an active session.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid variable graph: {0}")]
    InvalidGraph(String),

    #[error("remote resolution failed: {0}")]
    Remote(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("task {task_id} failed: {message}")]
    TaskFailed { task_id: String, message: String },

    #[error("task {task_id} was cancelled by the execution service")]
    TaskCancelled { task_id: String },

    /// The task was cancelled locally before completing; its result will never be observed.
    #[error("task {task_id} was superseded")]
    Stale { task_id: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache error: {0}")]
    Cache(String),
}

impl From<redis::RedisError> for ResolveError {
    fn from(err: redis::RedisError) -> Self {
        ResolveError::Cache(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;
