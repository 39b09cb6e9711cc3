use serde::{Deserialize, Serialize};

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reserved path segment that always resolves to the schema identifier.
    pub id_alias: String,
    /// Characters separating segments of an attribute path.
    pub path_separators: Vec<char>,
    /// Log a warning for incoming attributes the builder ignores.
    pub warn_on_ignored: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            id_alias: "__fid".to_string(),
            path_separators: vec!['.', '/'],
            warn_on_ignored: true,
        }
    }
}

impl EngineConfig {
    pub(crate) fn split_path<'p>(&self, path: &'p str) -> Vec<&'p str> {
        path.split(|c: char| self.path_separators.contains(&c))
            .collect()
    }
}
