pub mod builder;

use std::collections::HashSet;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use crate::error::{ResolveError, Result};

/// 变量描述 (由应用声明层构造，对解析器只读)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "__typename")]
pub enum Variable {
    #[serde(rename = "Variable")]
    Plain(PlainVariable),
    #[serde(rename = "DerivedVariable")]
    Derived(DerivedVariable),
    #[serde(rename = "DerivedDataVariable")]
    DerivedData(DerivedDataVariable),
}

/// 普通变量：叶子节点，持有默认值
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlainVariable {
    pub uid: String,
    #[serde(default)]
    pub default: Value,
    /// Path segments selecting a sub-field of the stored value
    #[serde(default)]
    pub nested: Vec<String>,
}

/// 派生变量：由 `variables` 计算得出，`deps` 决定缓存敏感性
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DerivedVariable {
    pub uid: String,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub deps: Vec<Variable>,
    #[serde(default)]
    pub nested: Vec<String>,
}

/// 派生数据变量：结果为表格数据，额外携带服务端过滤条件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DerivedDataVariable {
    #[serde(flatten)]
    pub derived: DerivedVariable,
    /// Opaque filter expression, passed through to the execution service untouched
    #[serde(default)]
    pub filters: Option<Value>,
}

impl Variable {
    pub fn uid(&self) -> &str {
        match self {
            Variable::Plain(p) => &p.uid,
            Variable::Derived(d) => &d.uid,
            Variable::DerivedData(d) => &d.derived.uid,
        }
    }

    /// The derived part of a derived (data) variable, `None` for plain variables.
    pub fn as_derived(&self) -> Option<&DerivedVariable> {
        match self {
            Variable::Plain(_) => None,
            Variable::Derived(d) => Some(d),
            Variable::DerivedData(d) => Some(&d.derived),
        }
    }

    pub fn is_data_variable(&self) -> bool {
        matches!(self, Variable::DerivedData(_))
    }

    pub fn filters(&self) -> Option<&Value> {
        match self {
            Variable::DerivedData(d) => d.filters.as_ref(),
            _ => None,
        }
    }

    /// Checks the whole tree: every `deps` entry must also be listed in `variables`,
    /// and a derived uid may not reappear below itself.
    pub fn validate(&self) -> Result<()> {
        let mut ancestors = Vec::new();
        validate_tree(self, &mut ancestors)
    }
}

fn validate_tree<'a>(variable: &'a Variable, ancestors: &mut Vec<&'a str>) -> Result<()> {
    let Some(derived) = variable.as_derived() else {
        return Ok(());
    };

    if ancestors.contains(&derived.uid.as_str()) {
        return Err(ResolveError::InvalidGraph(format!(
            "derived variable {} depends on itself",
            derived.uid
        )));
    }

    let inputs: HashSet<&str> = derived.variables.iter().map(|v| v.uid()).collect();
    if let Some(missing) = derived.deps.iter().find(|d| !inputs.contains(d.uid())) {
        return Err(ResolveError::InvalidGraph(format!(
            "dependency {} of {} is not listed in its variables",
            missing.uid(),
            derived.uid
        )));
    }

    ancestors.push(&derived.uid);
    for child in &derived.variables {
        validate_tree(child, ancestors)?;
    }
    ancestors.pop();
    Ok(())
}

impl PlainVariable {
    pub fn new(uid: &str, default: impl Into<Value>) -> Self {
        Self {
            uid: uid.to_string(),
            default: default.into(),
            nested: Vec::new(),
        }
    }

    pub fn nested(mut self, path: &[&str]) -> Self {
        self.nested = path.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Applies the `nested` path to a stored value. Missing segments yield `null`.
    pub fn select(&self, value: &Value) -> Value {
        let mut current = value;
        for segment in &self.nested {
            match current.get(segment.as_str()) {
                Some(next) => current = next,
                None => return Value::Null,
            }
        }
        current.clone()
    }

    /// Key used for the reference placeholder and the request `lookup` map.
    pub fn reference(&self) -> String {
        if self.nested.is_empty() {
            format!("Variable:{}", self.uid)
        } else {
            format!("Variable:{}:{}", self.uid, self.nested.join(","))
        }
    }
}

impl From<PlainVariable> for Variable {
    fn from(value: PlainVariable) -> Self {
        Variable::Plain(value)
    }
}

impl From<DerivedVariable> for Variable {
    fn from(value: DerivedVariable) -> Self {
        Variable::Derived(value)
    }
}

impl From<DerivedDataVariable> for Variable {
    fn from(value: DerivedDataVariable) -> Self {
        Variable::DerivedData(value)
    }
}

/// A set of top-level variable declarations, as loaded from a graph file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VariableGraph {
    #[serde(default)]
    pub variables: Vec<Variable>,
}

impl VariableGraph {
    pub fn get(&self, uid: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.uid() == uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn select_walks_nested_path() {
        let var = PlainVariable::new("form", json!({})).nested(&["user", "name"]);
        let stored = json!({"user": {"name": "ada", "age": 36}});
        assert_eq!(var.select(&stored), json!("ada"));
        assert_eq!(var.select(&json!({"user": {}})), Value::Null);
        assert_eq!(var.reference(), "Variable:form:user,name");
    }

    #[test]
    fn deserializes_typename_tagged_descriptors() {
        let raw = json!({
            "__typename": "DerivedDataVariable",
            "uid": "table",
            "variables": [{"__typename": "Variable", "uid": "x", "default": 5}],
            "deps": [{"__typename": "Variable", "uid": "x", "default": 5}],
            "filters": {"column": "col1", "value": "val1"}
        });
        let var: Variable = serde_json::from_value(raw).unwrap();
        assert!(var.is_data_variable());
        assert_eq!(var.uid(), "table");
        assert_eq!(var.filters(), Some(&json!({"column": "col1", "value": "val1"})));
        assert_eq!(var.as_derived().unwrap().variables.len(), 1);
    }
}
