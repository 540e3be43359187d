use anyhow::{Result, Context as AnyhowContext};
use std::fs;
use std::path::Path;
use crate::variables::VariableGraph;

pub fn load_graph_from_yaml(file_path: &Path) -> Result<VariableGraph> {
    let yaml_content = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read YAML file from {}", file_path.display()))?;

    let graph: VariableGraph = serde_yaml::from_str(&yaml_content)
        .with_context(|| format!("Failed to deserialize YAML content from {}", file_path.display()))?;

    for variable in &graph.variables {
        variable
            .validate()
            .with_context(|| format!("Invalid variable {} in {}", variable.uid(), file_path.display()))?;
    }

    Ok(graph)
}
