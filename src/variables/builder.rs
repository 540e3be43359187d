use crate::variables::{Variable, PlainVariable, DerivedVariable, DerivedDataVariable};
use serde_json::Value;

pub fn plain(uid: &str, default: impl Into<Value>) -> Variable {
    Variable::Plain(PlainVariable::new(uid, default))
}

pub struct DerivedBuilder {
    uid: String,
    variables: Vec<Variable>,
    deps: Vec<Variable>,
    nested: Vec<String>,
}

impl DerivedBuilder {
    pub fn new(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            variables: Vec::new(),
            deps: Vec::new(),
            nested: Vec::new(),
        }
    }

    /// 添加输入并标记为缓存相关依赖
    pub fn dep(mut self, variable: impl Into<Variable>) -> Self {
        let variable = variable.into();
        self.variables.push(variable.clone());
        self.deps.push(variable);
        self
    }

    /// 添加仅用于计算的输入 (不参与 deps 比较)
    pub fn input(mut self, variable: impl Into<Variable>) -> Self {
        self.variables.push(variable.into());
        self
    }

    pub fn nested(mut self, path: &[&str]) -> Self {
        self.nested = path.iter().map(|s| s.to_string()).collect();
        self
    }

    fn into_derived(self) -> DerivedVariable {
        DerivedVariable {
            uid: self.uid,
            variables: self.variables,
            deps: self.deps,
            nested: self.nested,
        }
    }

    pub fn build(self) -> Variable {
        Variable::Derived(self.into_derived())
    }

    pub fn build_data(self, filters: Option<Value>) -> Variable {
        Variable::DerivedData(DerivedDataVariable {
            derived: self.into_derived(),
            filters,
        })
    }
}
