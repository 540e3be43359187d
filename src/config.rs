use anyhow::{Result, Context as AnyhowContext};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use crate::remote::http::HttpExecutionService;
use crate::runtime::cache::{InMemoryResultCache, ResultCache};
use crate::runtime::redis_cache::RedisResultCache;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub cache: CacheConfig,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Opaque session token forwarded to the execution service
    pub session_token: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub redis_url: String,
    pub key_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            cache: CacheConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_secs: 30,
            session_token: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            key_prefix: "varflow".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn execution_service(&self) -> Result<HttpExecutionService> {
        HttpExecutionService::new(&self.remote.base_url, Duration::from_secs(self.remote.timeout_secs))
            .context("Failed to build HTTP client")
    }

    /// Result cache for one session.
    pub fn result_cache(&self, ws_channel: &str) -> Result<Arc<dyn ResultCache>> {
        match self.cache.backend {
            CacheBackend::Memory => Ok(Arc::new(InMemoryResultCache::new())),
            CacheBackend::Redis => {
                let client = redis::Client::open(self.cache.redis_url.as_str())
                    .with_context(|| format!("Invalid Redis URL {}", self.cache.redis_url))?;
                Ok(Arc::new(RedisResultCache::new(client, &self.cache.key_prefix, ws_channel)))
            }
        }
    }
}
