use crate::graph::GraphError;
use featuresync_model::{ConversionError, IdentityKey, ModelError};

///
/// EngineError
///
/// Structured failures for reconciliation and path resolution. Failures
/// raised below the top level are wrapped in `Context` carrying the dotted
/// attribute path that was being processed.
///

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown attribute `{name}`; valid attributes: [{}]", valid_names.join(", "))]
    UnknownAttribute {
        name: String,
        valid_names: Vec<String>,
    },

    #[error("conversion problem: {cause}")]
    ConversionProblem {
        #[source]
        cause: ConversionError,
    },

    #[error("attribute `{name}` expects a {expected} value, found {actual}")]
    InvalidAssociationType {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("attribute `{name}` is primitive and cannot be traversed further")]
    NotTraversable { name: String },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("entity graph failure: {0}")]
    Graph(#[from] GraphError),

    #[error("execution stopped after {applied} completed operation(s): {source}")]
    Execution {
        applied: usize,
        #[source]
        source: Box<Self>,
    },

    #[error("failed at {path}: {source}")]
    Context {
        path: String,
        #[source]
        source: Box<Self>,
    },
}

impl From<ConversionError> for EngineError {
    fn from(cause: ConversionError) -> Self {
        Self::ConversionProblem { cause }
    }
}

impl EngineError {
    /// Prepend a field segment to the error path.
    #[must_use]
    pub fn with_field(self, field: impl AsRef<str>) -> Self {
        self.with_path_segment(field.as_ref())
    }

    /// Prepend an index segment to the error path.
    #[must_use]
    pub fn with_index(self, index: usize) -> Self {
        self.with_path_segment(format!("[{index}]"))
    }

    /// Prepend a collection member segment, `[#id]`, for members that have no
    /// position in the incoming list.
    #[must_use]
    pub fn with_member(self, id: &IdentityKey) -> Self {
        self.with_path_segment(format!("[#{id}]"))
    }

    /// Full attribute path of the failure, if one was recorded.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Context { path, .. } => Some(path.as_str()),
            Self::Execution { source, .. } => source.path(),
            _ => None,
        }
    }

    /// Innermost, non-wrapping error.
    pub fn leaf(&self) -> &Self {
        match self {
            Self::Context { source, .. } | Self::Execution { source, .. } => source.leaf(),
            _ => self,
        }
    }

    /// Number of completed operations when execution failed.
    pub fn applied(&self) -> Option<usize> {
        match self {
            Self::Execution { applied, .. } => Some(*applied),
            _ => None,
        }
    }

    fn with_path_segment(self, segment: impl Into<String>) -> Self {
        let segment = segment.into();
        match self {
            Self::Context { path, source } => Self::Context {
                path: join_segments(&segment, &path),
                source,
            },
            source => Self::Context {
                path: segment,
                source: Box::new(source),
            },
        }
    }
}

fn join_segments(prefix: &str, suffix: &str) -> String {
    if suffix.starts_with('[') {
        format!("{prefix}{suffix}")
    } else {
        format!("{prefix}.{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_paths_join_fields_and_indexes() {
        let err = EngineError::NotTraversable {
            name: "street".to_string(),
        }
        .with_field("street")
        .with_index(1)
        .with_field("addresses");

        assert_eq!(err.path(), Some("addresses[1].street"));
        assert!(matches!(err.leaf(), EngineError::NotTraversable { .. }));
    }

    #[test]
    fn member_ids_render_as_hash_segments() {
        let err = EngineError::Graph(GraphError::Rejected("locked".to_string()))
            .with_member(&IdentityKey::Text("b-7".to_string()))
            .with_field("owners");

        assert_eq!(err.path(), Some("owners[#b-7]"));
    }

    #[test]
    fn unknown_attribute_lists_valid_names() {
        let err = EngineError::UnknownAttribute {
            name: "missing".to_string(),
            valid_names: vec!["name".to_string(), "owner".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "unknown attribute `missing`; valid attributes: [name, owner]"
        );
    }
}
