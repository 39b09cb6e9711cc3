//! Attribute values exchanged with the reconciliation engine.
//!
//! An [`AttributeValue`] is either a primitive scalar or an association
//! (many-to-one / one-to-many) whose payload is one or more
//! [`AssociationValue`]s. Association values own their attribute maps; cloning
//! one is a structural deep copy, so a "before" and an "after" tree never
//! share state.

use crate::error::ModelError;
use crate::scalar::{IdentityKey, PrimitiveKind, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named attribute values of one entity level.
pub type AttributeMap = BTreeMap<String, AttributeValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveAttribute {
    pub kind: PrimitiveKind,
    #[serde(default)]
    pub value: Option<Scalar>,
    #[serde(default)]
    pub editable: bool,
}

impl PrimitiveAttribute {
    pub fn new(kind: PrimitiveKind, value: Option<Scalar>) -> Self {
        Self {
            kind,
            value,
            editable: true,
        }
    }

    /// Primitive attribute whose kind is taken from the scalar itself.
    pub fn of(value: impl Into<Scalar>) -> Self {
        let value = value.into();
        Self::new(value.kind(), Some(value))
    }

    pub fn with_editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ManyToOneAttribute {
    #[serde(default)]
    pub value: Option<AssociationValue>,
    #[serde(default)]
    pub editable: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OneToManyAttribute {
    #[serde(default)]
    pub value: Option<Vec<AssociationValue>>,
    #[serde(default)]
    pub editable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttributeValue {
    Primitive(PrimitiveAttribute),
    ManyToOne(ManyToOneAttribute),
    OneToMany(OneToManyAttribute),
}

impl AttributeValue {
    pub fn primitive(value: impl Into<Scalar>) -> Self {
        Self::Primitive(PrimitiveAttribute::of(value))
    }

    /// A primitive of `kind` with no value.
    pub fn null(kind: PrimitiveKind) -> Self {
        Self::Primitive(PrimitiveAttribute::new(kind, None))
    }

    pub fn many_to_one(value: Option<AssociationValue>) -> Self {
        Self::ManyToOne(ManyToOneAttribute {
            value,
            editable: true,
        })
    }

    pub fn one_to_many(value: Option<Vec<AssociationValue>>) -> Self {
        Self::OneToMany(OneToManyAttribute {
            value,
            editable: true,
        })
    }

    /// Variant name used in diagnostics.
    pub const fn variant_name(&self) -> &'static str {
        match self {
            Self::Primitive(_) => "primitive",
            Self::ManyToOne(_) => "many_to_one",
            Self::OneToMany(_) => "one_to_many",
        }
    }

    pub const fn is_primitive(&self) -> bool {
        matches!(self, Self::Primitive(_))
    }

    pub const fn is_editable(&self) -> bool {
        match self {
            Self::Primitive(p) => p.editable,
            Self::ManyToOne(m) => m.editable,
            Self::OneToMany(o) => o.editable,
        }
    }

    pub fn as_primitive(&self) -> Option<&PrimitiveAttribute> {
        match self {
            Self::Primitive(p) => Some(p),
            _ => None,
        }
    }

    /// Scalar payload of a primitive value; associations have none.
    pub fn scalar(&self) -> Option<&Scalar> {
        self.as_primitive().and_then(|p| p.value.as_ref())
    }

    pub fn as_many_to_one(&self) -> Option<&AssociationValue> {
        match self {
            Self::ManyToOne(m) => m.value.as_ref(),
            _ => None,
        }
    }

    pub fn as_one_to_many(&self) -> Option<&[AssociationValue]> {
        match self {
            Self::OneToMany(o) => o.value.as_deref(),
            _ => None,
        }
    }
}

/// One related bean: an optional identifier plus nested attributes.
///
/// A primitive-only value is validated on construction and additionally
/// exposes [`AssociationValue::attributes_as_primitive`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AssociationValueRepr", into = "AssociationValueRepr")]
pub struct AssociationValue {
    id: Option<PrimitiveAttribute>,
    attributes: AttributeMap,
    primitive_only: bool,
}

#[derive(Serialize, Deserialize)]
struct AssociationValueRepr {
    #[serde(default)]
    id: Option<PrimitiveAttribute>,
    #[serde(default)]
    attributes: AttributeMap,
    #[serde(default)]
    primitive_only: bool,
}

impl TryFrom<AssociationValueRepr> for AssociationValue {
    type Error = ModelError;

    fn try_from(repr: AssociationValueRepr) -> Result<Self, Self::Error> {
        if repr.primitive_only {
            Self::primitive_only(repr.id, repr.attributes)
        } else {
            Ok(Self::new(repr.id, repr.attributes))
        }
    }
}

impl From<AssociationValue> for AssociationValueRepr {
    fn from(value: AssociationValue) -> Self {
        Self {
            id: value.id,
            attributes: value.attributes,
            primitive_only: value.primitive_only,
        }
    }
}

impl AssociationValue {
    /// Mixed association value; attributes may be of any variant.
    pub fn new(id: Option<PrimitiveAttribute>, attributes: AttributeMap) -> Self {
        Self {
            id,
            attributes,
            primitive_only: false,
        }
    }

    /// Primitive-only association value. Fails on the first non-primitive
    /// entry, naming its key.
    pub fn primitive_only(
        id: Option<PrimitiveAttribute>,
        attributes: AttributeMap,
    ) -> Result<Self, ModelError> {
        if let Some((key, _)) = attributes.iter().find(|(_, value)| !value.is_primitive()) {
            return Err(ModelError::MixedValueOnPrimitiveOnlyAssociation { key: key.clone() });
        }

        Ok(Self {
            id,
            attributes,
            primitive_only: true,
        })
    }

    /// Primitive-only value built from primitives; cannot fail.
    pub fn from_primitives(
        id: Option<PrimitiveAttribute>,
        attributes: BTreeMap<String, PrimitiveAttribute>,
    ) -> Self {
        Self {
            id,
            attributes: attributes
                .into_iter()
                .map(|(name, value)| (name, AttributeValue::Primitive(value)))
                .collect(),
            primitive_only: true,
        }
    }

    pub fn id(&self) -> Option<&PrimitiveAttribute> {
        self.id.as_ref()
    }

    pub fn id_value(&self) -> Option<&Scalar> {
        self.id.as_ref().and_then(|id| id.value.as_ref())
    }

    /// Identity of the bean; absent when there is no id or it is empty.
    pub fn identity(&self) -> Option<IdentityKey> {
        self.id_value().and_then(Scalar::identity)
    }

    pub const fn is_primitive_only(&self) -> bool {
        self.primitive_only
    }

    /// Every attribute regardless of variant.
    pub fn all_attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// Narrowed primitive view. Only available on primitive-only values.
    pub fn attributes_as_primitive(
        &self,
    ) -> Result<BTreeMap<&str, &PrimitiveAttribute>, ModelError> {
        if !self.primitive_only {
            return Err(ModelError::UnsupportedPrimitiveAccessOnMixedAssociation);
        }

        Ok(self
            .attributes
            .iter()
            .filter_map(|(name, value)| value.as_primitive().map(|p| (name.as_str(), p)))
            .collect())
    }

    /// Scalar payload of the named primitive attribute, if any.
    pub fn attribute_value(&self, name: &str) -> Option<&Scalar> {
        self.attributes.get(name).and_then(AttributeValue::scalar)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: AttributeValue) -> Result<(), ModelError> {
        let name = name.into();
        if self.primitive_only && !value.is_primitive() {
            return Err(ModelError::MixedValueOnPrimitiveOnlyAssociation { key: name });
        }
        self.attributes.insert(name, value);
        Ok(())
    }

    pub fn into_parts(self) -> (Option<PrimitiveAttribute>, AttributeMap) {
        (self.id, self.attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed() -> AssociationValue {
        let mut attrs = AttributeMap::new();
        attrs.insert("name".to_string(), AttributeValue::primitive("Main St"));
        attrs.insert(
            "city".to_string(),
            AttributeValue::many_to_one(Some(AssociationValue::new(
                Some(PrimitiveAttribute::of(3i64)),
                AttributeMap::new(),
            ))),
        );
        AssociationValue::new(Some(PrimitiveAttribute::of(1i64)), attrs)
    }

    #[test]
    fn primitive_only_rejects_association_entry() {
        let (id, attrs) = mixed().into_parts();
        let err = AssociationValue::primitive_only(id, attrs).unwrap_err();
        assert_eq!(
            err,
            ModelError::MixedValueOnPrimitiveOnlyAssociation {
                key: "city".to_string()
            }
        );
    }

    #[test]
    fn narrowed_view_requires_primitive_only() {
        let err = mixed().attributes_as_primitive().unwrap_err();
        assert_eq!(err, ModelError::UnsupportedPrimitiveAccessOnMixedAssociation);

        let mut attrs = BTreeMap::new();
        attrs.insert("name".to_string(), PrimitiveAttribute::of("x"));
        let value = AssociationValue::from_primitives(None, attrs);
        let view = value.attributes_as_primitive().unwrap();
        assert_eq!(view["name"].value, Some(Scalar::from("x")));
        assert_eq!(value.all_attributes().len(), 1);
    }

    #[test]
    fn attribute_value_only_returns_primitive_scalars() {
        let value = mixed();
        assert_eq!(value.attribute_value("name"), Some(&Scalar::from("Main St")));
        assert_eq!(value.attribute_value("city"), None);
        assert_eq!(value.attribute_value("missing"), None);
    }

    #[test]
    fn insert_into_primitive_only_keeps_invariant() {
        let mut value = AssociationValue::from_primitives(None, BTreeMap::new());
        let err = value
            .insert("owner", AttributeValue::many_to_one(None))
            .unwrap_err();
        assert!(matches!(
            err,
            ModelError::MixedValueOnPrimitiveOnlyAssociation { key } if key == "owner"
        ));
        value.insert("zip", AttributeValue::primitive("1234")).unwrap();
        assert_eq!(value.attribute_value("zip"), Some(&Scalar::from("1234")));
    }

    #[test]
    fn clone_is_a_deep_copy() {
        let original = mixed();
        let mut copy = original.clone();
        copy.insert("name", AttributeValue::primitive("Elm St")).unwrap();

        assert_eq!(original.attribute_value("name"), Some(&Scalar::from("Main St")));
        assert_eq!(copy.attribute_value("name"), Some(&Scalar::from("Elm St")));
    }

    #[test]
    fn empty_id_has_no_identity() {
        let value = AssociationValue::new(Some(PrimitiveAttribute::of("")), AttributeMap::new());
        assert!(value.id().is_some());
        assert_eq!(value.identity(), None);
    }

    #[test]
    fn deserializing_mixed_primitive_only_value_fails() {
        let json = serde_json::json!({
            "id": {"kind": "long", "value": {"kind": "long", "value": 1}},
            "attributes": {
                "owner": {"type": "many_to_one", "value": null}
            },
            "primitive_only": true
        });
        let err = serde_json::from_value::<AssociationValue>(json).unwrap_err();
        assert!(err.to_string().contains("owner"));
    }

    #[test]
    fn attribute_value_json_round_trip() {
        let value = AttributeValue::one_to_many(Some(vec![mixed()]));
        let json = serde_json::to_string(&value).unwrap();
        let back: AttributeValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
