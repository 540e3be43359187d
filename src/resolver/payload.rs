use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use serde_json::{json, Map, Value};
use crate::error::{ResolveError, Result};
use crate::resolver::ValueSource;
use crate::variables::{Variable, DerivedVariable};

/// 发送给远程执行服务的请求体 (同时作为缓存键的来源)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub values: Vec<Value>,
    /// `"Variable:<uid>"` -> current value, one entry per referenced plain variable
    pub lookup: BTreeMap<String, Value>,
    pub is_data_variable: bool,
    pub force: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Value>,
}

impl RequestPayload {
    pub fn cache_key(&self) -> Result<String> {
        cache_key(self)
    }
}

/// Builds the request payload for a derived (data) variable with `force: false`.
pub fn build_request_payload(variable: &Variable, source: &dyn ValueSource) -> Result<RequestPayload> {
    build_request_payload_with(variable, source, false)
}

pub fn build_request_payload_with(
    variable: &Variable,
    source: &dyn ValueSource,
    force: bool,
) -> Result<RequestPayload> {
    variable.validate()?;
    let derived = variable.as_derived().ok_or_else(|| {
        ResolveError::InvalidGraph(format!("{} is not a derived variable", variable.uid()))
    })?;

    let mut builder = PayloadBuilder {
        source,
        lookup: BTreeMap::new(),
    };
    let values = builder.values(derived);

    Ok(RequestPayload {
        values,
        lookup: builder.lookup,
        is_data_variable: variable.is_data_variable(),
        force,
        filters: match variable {
            Variable::DerivedData(data) => Some(data.filters.clone().unwrap_or(Value::Null)),
            _ => None,
        },
    })
}

/// Deterministic serialization of a payload, with object keys sorted at every level.
/// `force` is left out so a refreshed result is found again by plain reads.
pub fn cache_key(payload: &RequestPayload) -> Result<String> {
    let mut value = serde_json::to_value(payload)?;
    if let Value::Object(map) = &mut value {
        map.remove("force");
    }
    Ok(serde_json::to_string(&canonicalize(value))?)
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

// Single accumulator for the whole tree so every plain uid lands in `lookup` once.
struct PayloadBuilder<'a> {
    source: &'a dyn ValueSource,
    lookup: BTreeMap<String, Value>,
}

impl PayloadBuilder<'_> {
    fn values(&mut self, derived: &DerivedVariable) -> Vec<Value> {
        derived.variables.iter().map(|v| self.entry(v)).collect()
    }

    fn entry(&mut self, variable: &Variable) -> Value {
        match variable {
            Variable::Plain(plain) => {
                let reference = plain.reference();
                if !self.lookup.contains_key(&reference) {
                    self.lookup.insert(reference.clone(), self.source.current(plain));
                }
                json!({ "__ref": reference })
            }
            Variable::Derived(derived) => json!({
                "type": "derived",
                "uid": derived.uid,
                "values": self.values(derived),
                "force": false,
            }),
            Variable::DerivedData(data) => json!({
                "type": "derived-data",
                "uid": data.derived.uid,
                "values": self.values(&data.derived),
                "force": false,
                "filters": data.filters.clone().unwrap_or(Value::Null),
            }),
        }
    }
}
