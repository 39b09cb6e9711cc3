use anyhow::{Context, Result};
use featuresync_engine::{EngineConfig, GraphSnapshot, MemoryGraph};
use featuresync_model::{AttributeMap, FeatureSchema};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {what} {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid {what} {}", path.display()))
}

pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => read_json(path, "engine config"),
        None => Ok(EngineConfig::default()),
    }
}

pub fn load_schema(path: &Path) -> Result<FeatureSchema> {
    FeatureSchema::from_path(path).with_context(|| format!("invalid schema {}", path.display()))
}

pub fn load_graph(path: &Path) -> Result<MemoryGraph> {
    let snapshot: GraphSnapshot = read_json(path, "graph snapshot")?;
    MemoryGraph::from_snapshot(snapshot)
        .with_context(|| format!("inconsistent graph snapshot {}", path.display()))
}

/// Incoming attribute tree: a JSON object of attribute name to value.
pub fn load_input(path: &Path) -> Result<AttributeMap> {
    read_json(path, "attribute input")
}

pub fn write_graph(graph: &MemoryGraph, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&graph.snapshot())?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}
