use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use crate::error::Result;

/// A resolved value plus the trigger generation it was computed under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    pub generation: u64,
    pub value: Value,
}

#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, cache_key: &str) -> Result<Option<CachedResult>>;
    async fn set(&self, cache_key: &str, entry: CachedResult) -> Result<()>;
}

pub struct InMemoryResultCache {
    entries: DashMap<String, CachedResult>,
}

impl InMemoryResultCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryResultCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultCache for InMemoryResultCache {
    async fn get(&self, cache_key: &str) -> Result<Option<CachedResult>> {
        Ok(self.entries.get(cache_key).map(|e| e.value().clone()))
    }

    async fn set(&self, cache_key: &str, entry: CachedResult) -> Result<()> {
        self.entries.insert(cache_key.to_string(), entry);
        Ok(())
    }
}
