//! Feature schemas: the identifier and attribute layout of one feature type.
//!
//! Schemas are configuration. They are loaded once (usually from JSON),
//! validated, and then only read by the engine. Whether an attribute is
//! primitive or an association is decided here, by the variant of
//! [`AttributeInfo`], and never re-derived later.

use crate::error::SchemaError;
use crate::scalar::PrimitiveKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimitiveAttributeInfo {
    pub name: String,
    pub kind: PrimitiveKind,
    #[serde(default)]
    pub editable: bool,
}

impl PrimitiveAttributeInfo {
    pub fn new(name: impl Into<String>, kind: PrimitiveKind, editable: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            editable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    ManyToOne,
    OneToMany,
}

impl AssociationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ManyToOne => "many_to_one",
            Self::OneToMany => "one_to_many",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationAttributeInfo {
    pub name: String,
    pub kind: AssociationKind,
    #[serde(default)]
    pub editable: bool,
    /// Schema of the related feature type.
    pub schema: FeatureSchema,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttributeInfo {
    Primitive(PrimitiveAttributeInfo),
    Association(AssociationAttributeInfo),
}

impl AttributeInfo {
    /// Editable primitive attribute.
    pub fn primitive(name: impl Into<String>, kind: PrimitiveKind) -> Self {
        Self::Primitive(PrimitiveAttributeInfo::new(name, kind, true))
    }

    /// Editable many-to-one association.
    pub fn many_to_one(name: impl Into<String>, schema: FeatureSchema) -> Self {
        Self::association(name, AssociationKind::ManyToOne, schema)
    }

    /// Editable one-to-many association.
    pub fn one_to_many(name: impl Into<String>, schema: FeatureSchema) -> Self {
        Self::association(name, AssociationKind::OneToMany, schema)
    }

    fn association(name: impl Into<String>, kind: AssociationKind, schema: FeatureSchema) -> Self {
        Self::Association(AssociationAttributeInfo {
            name: name.into(),
            kind,
            editable: true,
            schema,
        })
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        match &mut self {
            Self::Primitive(p) => p.editable = false,
            Self::Association(a) => a.editable = false,
        }
        self
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Primitive(p) => &p.name,
            Self::Association(a) => &a.name,
        }
    }

    pub const fn is_editable(&self) -> bool {
        match self {
            Self::Primitive(p) => p.editable,
            Self::Association(a) => a.editable,
        }
    }

    pub fn as_primitive(&self) -> Option<&PrimitiveAttributeInfo> {
        match self {
            Self::Primitive(p) => Some(p),
            Self::Association(_) => None,
        }
    }

    pub fn as_association(&self) -> Option<&AssociationAttributeInfo> {
        match self {
            Self::Association(a) => Some(a),
            Self::Primitive(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Feature type / datasource name, used when resolving related entities.
    pub name: String,
    pub identifier: PrimitiveAttributeInfo,
    #[serde(default)]
    pub attributes: Vec<AttributeInfo>,
}

impl FeatureSchema {
    pub fn new(name: impl Into<String>, identifier: PrimitiveAttributeInfo) -> Self {
        Self {
            name: name.into(),
            identifier,
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: AttributeInfo) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    /// Declared attribute names in schema order.
    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes.iter().map(|a| a.name().to_string()).collect()
    }

    /// Parse and validate a schema from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, SchemaError> {
        let schema: Self = serde_json::from_str(text)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_path(path: &Path) -> Result<Self, SchemaError> {
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Structural checks, applied recursively to nested schemas.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.is_empty() {
            return Err(SchemaError::EmptySchemaName);
        }
        if self.identifier.name.is_empty() {
            return Err(SchemaError::EmptyName {
                schema: self.name.clone(),
            });
        }

        let mut seen = BTreeSet::new();
        for attribute in &self.attributes {
            let name = attribute.name();
            if name.is_empty() {
                return Err(SchemaError::EmptyName {
                    schema: self.name.clone(),
                });
            }
            if name == self.identifier.name {
                return Err(SchemaError::ShadowsIdentifier {
                    schema: self.name.clone(),
                    name: name.to_string(),
                });
            }
            if !seen.insert(name) {
                return Err(SchemaError::DuplicateAttribute {
                    schema: self.name.clone(),
                    name: name.to_string(),
                });
            }
            if let AttributeInfo::Association(association) = attribute {
                association.schema.validate()?;
            }
        }

        Ok(())
    }
}
