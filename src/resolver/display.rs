use serde::Serialize;
use serde_json::Value;
use crate::error::Result;
use crate::resolver::ValueSource;
use crate::variables::{Variable, DerivedVariable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DerivedKind {
    Derived,
    DerivedData,
}

/// 展示用的解析结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResolvedValue {
    Value(Value),
    Derived(ResolvedDerived),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedDerived {
    #[serde(rename = "type")]
    pub kind: DerivedKind,
    pub uid: String,
    pub values: Vec<ResolvedValue>,
    /// Comparison values of the significant dependencies, in `deps` order
    pub deps: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Value>,
}

impl ResolvedValue {
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Flattens a variable into its display form. Plain variables resolve to their
/// current value; derived variables to a `{type, uid, values, deps}` tree.
pub fn resolve_display(variable: &Variable, source: &dyn ValueSource) -> Result<ResolvedValue> {
    variable.validate()?;
    Ok(display_value(variable, source))
}

/// The comparison array for a derived variable: one entry per `deps` item.
/// Entries that are only listed in `variables` never show up here.
pub fn significant_deps(variable: &Variable, source: &dyn ValueSource) -> Vec<Value> {
    match variable.as_derived() {
        Some(derived) => derived.deps.iter().map(|dep| comparison_value(dep, source)).collect(),
        None => Vec::new(),
    }
}

fn display_value(variable: &Variable, source: &dyn ValueSource) -> ResolvedValue {
    match variable {
        Variable::Plain(plain) => ResolvedValue::Value(source.current(plain)),
        Variable::Derived(derived) => {
            ResolvedValue::Derived(display_derived(DerivedKind::Derived, derived, None, source))
        }
        Variable::DerivedData(data) => ResolvedValue::Derived(display_derived(
            DerivedKind::DerivedData,
            &data.derived,
            Some(data.filters.clone().unwrap_or(Value::Null)),
            source,
        )),
    }
}

fn display_derived(
    kind: DerivedKind,
    derived: &DerivedVariable,
    filters: Option<Value>,
    source: &dyn ValueSource,
) -> ResolvedDerived {
    ResolvedDerived {
        kind,
        uid: derived.uid.clone(),
        values: derived.variables.iter().map(|v| display_value(v, source)).collect(),
        deps: derived.deps.iter().map(|d| comparison_value(d, source)).collect(),
        filters,
    }
}

// A nested derived dependency compares by its own significant deps, never by its full tree.
fn comparison_value(variable: &Variable, source: &dyn ValueSource) -> Value {
    match variable {
        Variable::Plain(plain) => source.current(plain),
        _ => Value::Array(significant_deps(variable, source)),
    }
}
