use dashmap::DashMap;

/// Write side of the reactive store: bumping a key invalidates anything cached against it.
pub trait Trigger: Send + Sync {
    fn bump(&self, key: &str);
}

/// 触发器计数表 (每个 key 一个递增的代数)
#[derive(Debug, Default)]
pub struct TriggerIndex {
    counters: DashMap<String, u64>,
}

impl TriggerIndex {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }

    /// Current generation of `key`; keys never bumped are at 0.
    pub fn current(&self, key: &str) -> u64 {
        self.counters.get(key).map(|c| *c.value()).unwrap_or(0)
    }
}

impl Trigger for TriggerIndex {
    fn bump(&self, key: &str) {
        *self.counters.entry(key.to_string()).or_insert(0) += 1;
    }
}

pub fn trigger_key(variable_uid: &str) -> String {
    format!("{}:trigger", variable_uid)
}
