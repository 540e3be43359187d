use async_trait::async_trait;
use crate::error::Result;
use crate::runtime::cache::{CachedResult, ResultCache};
use redis::AsyncCommands;

/// Session-scoped result cache kept in Redis, one hash per ws channel.
pub struct RedisResultCache {
    client: redis::Client,
    key_prefix: String,
    ws_channel: String,
}

impl RedisResultCache {
    pub fn new(client: redis::Client, key_prefix: &str, ws_channel: &str) -> Self {
        Self {
            client,
            key_prefix: key_prefix.to_string(),
            ws_channel: ws_channel.to_string(),
        }
    }

    fn hash_key(&self) -> String {
        format!("{}:session:{}:results", self.key_prefix, self.ws_channel)
    }

    /// Removes every cached result of this session.
    pub async fn clear(&self) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(self.hash_key()).await?;
        Ok(())
    }
}

#[async_trait]
impl ResultCache for RedisResultCache {
    async fn get(&self, cache_key: &str) -> Result<Option<CachedResult>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.hget(self.hash_key(), cache_key).await?;

        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, cache_key: &str, entry: CachedResult) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(&entry)?;
        let _: () = conn.hset(self.hash_key(), cache_key, serialized).await?;
        Ok(())
    }
}
