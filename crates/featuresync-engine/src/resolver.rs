//! Attribute path resolution (read path).
//!
//! Paths are segment lists (`owner.address.street`, `owner/address/street`)
//! walked against the schema. An absent entity along the way is not an error:
//! resolution continues and yields empty values.

use crate::config::EngineConfig;
use crate::convert::DtoConverter;
use crate::error::EngineError;
use crate::graph::{Entity, EntityCollection};
use featuresync_model::{
    AssociationAttributeInfo, AssociationKind, AssociationValue, AttributeInfo, AttributeMap,
    AttributeValue, FeatureSchema, ManyToOneAttribute, OneToManyAttribute, PrimitiveAttributeInfo,
    Scalar,
};
use tracing::trace;

pub struct PathResolver<'a, C> {
    config: &'a EngineConfig,
    converter: &'a C,
}

impl<'a, C: DtoConverter> PathResolver<'a, C> {
    pub fn new(config: &'a EngineConfig, converter: &'a C) -> Self {
        Self { config, converter }
    }

    pub fn resolve<E: Entity>(
        &self,
        schema: &FeatureSchema,
        entity: Option<&E>,
        path: &str,
    ) -> Result<AttributeValue, EngineError> {
        let segments = self.config.split_path(path);
        self.resolve_segments(schema, entity, &segments)
    }

    fn resolve_segments<E: Entity>(
        &self,
        schema: &FeatureSchema,
        entity: Option<&E>,
        segments: &[&str],
    ) -> Result<AttributeValue, EngineError> {
        let (first, rest) = match segments.split_first() {
            Some((first, rest)) => (*first, rest),
            None => ("", &[][..]),
        };
        trace!(schema = %schema.name, segment = first, remaining = rest.len(), "resolving path segment");

        if first == schema.identifier.name || first == self.config.id_alias {
            let raw = match entity {
                Some(entity) => entity.id(&schema.identifier.name)?,
                None => None,
            };
            return self
                .convert(raw, &schema.identifier)
                .map_err(|err| err.with_field(first));
        }

        let info = schema
            .attribute(first)
            .ok_or_else(|| EngineError::UnknownAttribute {
                name: first.to_string(),
                valid_names: schema.attribute_names(),
            })?;

        match info {
            AttributeInfo::Primitive(primitive) => {
                if !rest.is_empty() {
                    return Err(EngineError::NotTraversable {
                        name: primitive.name.clone(),
                    });
                }
                let raw = match entity {
                    Some(entity) => entity.attribute(&primitive.name)?,
                    None => None,
                };
                self.convert(raw, primitive)
                    .map_err(|err| err.with_field(first))
            }
            AttributeInfo::Association(association) if !rest.is_empty() => {
                let child = match entity {
                    Some(entity) => entity.child(&association.name)?,
                    None => None,
                };
                self.resolve_segments(&association.schema, child.as_ref(), rest)
                    .map_err(|err| err.with_field(first))
            }
            AttributeInfo::Association(association) => self
                .association_value(association, entity)
                .map_err(|err| err.with_field(first)),
        }
    }

    fn association_value<E: Entity>(
        &self,
        association: &AssociationAttributeInfo,
        entity: Option<&E>,
    ) -> Result<AttributeValue, EngineError> {
        match association.kind {
            AssociationKind::ManyToOne => {
                let child = match entity {
                    Some(entity) => entity.child(&association.name)?,
                    None => None,
                };
                let value = child
                    .map(|child| self.snapshot(&association.schema, &child))
                    .transpose()?;
                Ok(AttributeValue::ManyToOne(ManyToOneAttribute {
                    value,
                    editable: association.editable,
                }))
            }
            AssociationKind::OneToMany => {
                let collection = match entity {
                    Some(entity) => entity.child_collection(&association.name)?,
                    None => None,
                };
                let value = match collection {
                    Some(collection) => Some(
                        collection
                            .entities()?
                            .iter()
                            .enumerate()
                            .map(|(index, member)| {
                                self.snapshot(&association.schema, member)
                                    .map_err(|err| err.with_index(index))
                            })
                            .collect::<Result<Vec<_>, _>>()?,
                    ),
                    None => None,
                };
                Ok(AttributeValue::OneToMany(OneToManyAttribute {
                    value,
                    editable: association.editable,
                }))
            }
        }
    }

    /// Full association snapshot of `entity`: its id plus every declared
    /// attribute, editable or not.
    pub fn snapshot<E: Entity>(
        &self,
        schema: &FeatureSchema,
        entity: &E,
    ) -> Result<AssociationValue, EngineError> {
        let raw_id = entity.id(&schema.identifier.name)?;
        let id = match self
            .convert(raw_id, &schema.identifier)
            .map_err(|err| err.with_field(&schema.identifier.name))?
        {
            AttributeValue::Primitive(id) => id,
            other => {
                return Err(EngineError::InvalidAssociationType {
                    name: schema.identifier.name.clone(),
                    expected: "primitive",
                    actual: other.variant_name(),
                })
            }
        };

        let mut attributes = AttributeMap::new();
        for info in &schema.attributes {
            let name = info.name();
            let value = self.resolve_segments(schema, Some(entity), &[name])?;
            attributes.insert(name.to_string(), value);
        }

        Ok(AssociationValue::new(Some(id), attributes))
    }

    fn convert(
        &self,
        raw: Option<Scalar>,
        info: &PrimitiveAttributeInfo,
    ) -> Result<AttributeValue, EngineError> {
        Ok(self.converter.to_dto(raw, info)?)
    }
}
