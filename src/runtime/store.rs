use dashmap::DashMap;
use serde_json::Value;
use crate::resolver::ValueSource;
use crate::variables::PlainVariable;

/// 普通变量的当前值 (未设置时回退到默认值)
#[derive(Debug, Default)]
pub struct VariableStore {
    values: DashMap<String, Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
        }
    }

    pub fn set(&self, uid: &str, value: Value) {
        self.values.insert(uid.to_string(), value);
    }

    pub fn get(&self, uid: &str) -> Option<Value> {
        self.values.get(uid).map(|v| v.value().clone())
    }

    /// Drops the stored value so the variable falls back to its default.
    pub fn reset(&self, uid: &str) {
        self.values.remove(uid);
    }
}

impl ValueSource for VariableStore {
    fn current(&self, variable: &PlainVariable) -> Value {
        match self.values.get(&variable.uid) {
            Some(stored) => variable.select(stored.value()),
            None => variable.select(&variable.default),
        }
    }
}
