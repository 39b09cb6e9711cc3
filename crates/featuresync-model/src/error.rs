use crate::scalar::PrimitiveKind;
use std::path::PathBuf;

/// Invariant violations on attribute values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("primitive-only association contains non-primitive attribute `{key}`")]
    MixedValueOnPrimitiveOnlyAssociation { key: String },

    #[error("primitive attribute view is not supported on a mixed association value")]
    UnsupportedPrimitiveAccessOnMixedAssociation,
}

/// A scalar could not be represented as the requested primitive kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot convert {from} value `{value}` to {to}: {reason}")]
pub struct ConversionError {
    pub from: PrimitiveKind,
    pub to: PrimitiveKind,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("schema `{schema}` declares attribute `{name}` more than once")]
    DuplicateAttribute { schema: String, name: String },

    #[error("schema `{schema}` attribute `{name}` shadows the identifier")]
    ShadowsIdentifier { schema: String, name: String },

    #[error("schema `{schema}` contains an empty attribute or identifier name")]
    EmptyName { schema: String },

    #[error("schema name must not be empty")]
    EmptySchemaName,

    #[error("failed to read schema {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse schema: {0}")]
    Parse(#[from] serde_json::Error),
}
