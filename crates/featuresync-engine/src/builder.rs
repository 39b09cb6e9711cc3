//! Operation builder: reconciles an incoming attribute tree against the
//! current entity graph and produces the operation tree that closes the gap.
//!
//! Building reads the graph but never writes it. Every structurally invalid
//! input is reported before the executor touches a single entity.
//!
//! Many-to-one rules, given the incoming value and the current child:
//!
//! ```text
//! incoming None                         -> DeleteManyToOne
//! no current child                      -> CreateManyToOne
//! incoming id empty or != current id    -> CreateManyToOne (replace link)
//! ids match                             -> UpdateManyToOne
//! ```
//!
//! One-to-many lists are diffed by identity: ids present on both sides become
//! `UpdateManyValue`, everything else incoming becomes `AddManyValue`, and
//! existing ids missing from the list become `RemoveManyValue`.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::graph::{identity_of, Entity, EntityCollection};
use crate::operation::{Assignment, EntityUpdate, Operation};
use featuresync_model::{
    AssociationAttributeInfo, AssociationKind, AttributeInfo, AttributeMap, AttributeValue,
    FeatureSchema, IdentityKey, PrimitiveAttribute, PrimitiveAttributeInfo, Scalar,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

pub struct OperationBuilder<'a> {
    config: &'a EngineConfig,
}

impl<'a> OperationBuilder<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Root operation for `target`.
    pub fn build_root<E: Entity>(
        &self,
        schema: &FeatureSchema,
        target: E,
        attributes: AttributeMap,
    ) -> Result<Operation<E>, EngineError> {
        let update = self.build(schema, Some(&target), attributes)?;
        Ok(Operation::UpdateEntity { target, update })
    }

    /// Update for one entity level. `entity` is `None` when the entity does
    /// not exist yet, in which case every association compares against empty.
    pub fn build<E: Entity>(
        &self,
        schema: &FeatureSchema,
        entity: Option<&E>,
        attributes: AttributeMap,
    ) -> Result<EntityUpdate<E>, EngineError> {
        let mut primitives: HashMap<&str, &PrimitiveAttributeInfo> = HashMap::new();
        let mut associations: HashMap<&str, &AssociationAttributeInfo> = HashMap::new();
        for info in schema.attributes.iter().filter(|info| info.is_editable()) {
            match info {
                AttributeInfo::Primitive(p) => {
                    primitives.insert(p.name.as_str(), p);
                }
                AttributeInfo::Association(a) => {
                    associations.insert(a.name.as_str(), a);
                }
            }
        }

        let mut update = EntityUpdate::default();
        for (name, value) in attributes {
            if let Some(info) = primitives.get(name.as_str()) {
                let assignment = assign(info, value).map_err(|err| err.with_field(&name))?;
                update.assignments.push(assignment);
            } else if let Some(info) = associations.get(name.as_str()) {
                let operations = match info.kind {
                    AssociationKind::ManyToOne => self.many_to_one(info, entity, value).map(|op| vec![op]),
                    AssociationKind::OneToMany => self.one_to_many(info, entity, value),
                }
                .map_err(|err| err.with_field(&name))?;
                update.children.extend(operations);
            } else if self.config.warn_on_ignored {
                warn!(
                    schema = %schema.name,
                    attribute = %name,
                    "ignoring incoming attribute that is unknown or not editable"
                );
            }
        }

        Ok(update)
    }

    fn many_to_one<E: Entity>(
        &self,
        info: &AssociationAttributeInfo,
        entity: Option<&E>,
        value: AttributeValue,
    ) -> Result<Operation<E>, EngineError> {
        let incoming = match value {
            AttributeValue::ManyToOne(incoming) => incoming,
            other => {
                return Err(invalid_shape(&info.name, AssociationKind::ManyToOne.as_str(), &other))
            }
        };
        let attribute = info.name.clone();
        let nested = &info.schema;

        let Some(new_value) = incoming.value else {
            debug!(%attribute, "delete many-to-one reference");
            return Ok(Operation::DeleteManyToOne { attribute });
        };

        let current = match entity {
            Some(entity) => entity.child(&info.name)?,
            None => None,
        };
        let (id, attributes) = new_value.into_parts();
        let id = incoming_id(nested, id)?;
        let incoming_identity = id.as_ref().and_then(Scalar::identity);

        if let (Some(child), Some(identity)) = (current, incoming_identity) {
            if identity_of(&child, &nested.identifier)?.as_ref() == Some(&identity) {
                debug!(%attribute, id = %identity, "update many-to-one in place");
                let update = self.build(nested, Some(&child), attributes)?;
                return Ok(Operation::UpdateManyToOne {
                    attribute,
                    target: child,
                    update,
                });
            }
        }

        debug!(%attribute, datasource = %nested.name, "create many-to-one reference");
        let update = self.build::<E>(nested, None, attributes)?;
        Ok(Operation::CreateManyToOne {
            attribute,
            datasource: nested.name.clone(),
            id,
            update,
        })
    }

    fn one_to_many<E: Entity>(
        &self,
        info: &AssociationAttributeInfo,
        entity: Option<&E>,
        value: AttributeValue,
    ) -> Result<Vec<Operation<E>>, EngineError> {
        let incoming = match value {
            AttributeValue::OneToMany(incoming) => incoming,
            other => {
                return Err(invalid_shape(&info.name, AssociationKind::OneToMany.as_str(), &other))
            }
        };
        let nested = &info.schema;

        let Some(entries) = incoming.value else {
            debug!(attribute = %info.name, "delete one-to-many collection");
            return Ok(vec![Operation::DeleteOneToMany {
                attribute: info.name.clone(),
            }]);
        };

        let existing = self.existing_members(info, entity)?;

        let mut prepared = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let (id, attributes) = entry.into_parts();
            let id = incoming_id(nested, id).map_err(|err| err.with_index(index))?;
            prepared.push((id, attributes));
        }
        let incoming_ids: BTreeSet<IdentityKey> = prepared
            .iter()
            .filter_map(|(id, _)| id.as_ref().and_then(Scalar::identity))
            .collect();

        let mut operations = Vec::with_capacity(prepared.len());
        for (index, (id, attributes)) in prepared.into_iter().enumerate() {
            let matched = id
                .as_ref()
                .and_then(Scalar::identity)
                .and_then(|key| existing.get(&key).map(|target| (key, target.clone())));

            let operation = match matched {
                Some((key, target)) => {
                    debug!(attribute = %info.name, id = %key, "update collection member");
                    let update = self
                        .build(nested, Some(&target), attributes)
                        .map_err(|err| err.with_index(index))?;
                    Operation::UpdateManyValue {
                        attribute: info.name.clone(),
                        id: key,
                        target,
                        update,
                    }
                }
                None => {
                    debug!(attribute = %info.name, datasource = %nested.name, "add collection member");
                    let update = self
                        .build::<E>(nested, None, attributes)
                        .map_err(|err| err.with_index(index))?;
                    Operation::AddManyValue {
                        attribute: info.name.clone(),
                        datasource: nested.name.clone(),
                        id,
                        update,
                    }
                }
            };
            operations.push(operation);
        }

        for (key, target) in existing {
            if !incoming_ids.contains(&key) {
                debug!(attribute = %info.name, id = %key, "remove collection member");
                operations.push(Operation::RemoveManyValue {
                    attribute: info.name.clone(),
                    id: key,
                    target,
                });
            }
        }

        Ok(operations)
    }

    /// Current collection members keyed by identity. Members without an id
    /// cannot be matched and are left untouched.
    fn existing_members<E: Entity>(
        &self,
        info: &AssociationAttributeInfo,
        entity: Option<&E>,
    ) -> Result<BTreeMap<IdentityKey, E>, EngineError> {
        let mut members = BTreeMap::new();
        let Some(entity) = entity else {
            return Ok(members);
        };
        let Some(collection) = entity.child_collection(&info.name)? else {
            return Ok(members);
        };

        for member in collection.entities()? {
            match identity_of(&member, &info.schema.identifier)? {
                Some(key) => {
                    members.insert(key, member);
                }
                None => debug!(attribute = %info.name, "skipping collection member without id"),
            }
        }
        Ok(members)
    }
}

fn assign(info: &PrimitiveAttributeInfo, value: AttributeValue) -> Result<Assignment, EngineError> {
    let primitive = match value {
        AttributeValue::Primitive(primitive) => primitive,
        other => return Err(invalid_shape(&info.name, "primitive", &other)),
    };
    let value = primitive
        .value
        .map(|scalar| scalar.coerce_to(info.kind))
        .transpose()?;
    Ok(Assignment {
        name: info.name.clone(),
        value,
    })
}

/// Incoming id coerced to the identifier's kind. Empty ids count as absent.
fn incoming_id(
    schema: &FeatureSchema,
    id: Option<PrimitiveAttribute>,
) -> Result<Option<Scalar>, EngineError> {
    let Some(scalar) = id.and_then(|id| id.value) else {
        return Ok(None);
    };
    if scalar.identity().is_none() {
        return Ok(None);
    }
    let scalar = scalar
        .coerce_to(schema.identifier.kind)
        .map_err(|cause| EngineError::from(cause).with_field(&schema.identifier.name))?;
    Ok(Some(scalar))
}

fn invalid_shape(name: &str, expected: &'static str, actual: &AttributeValue) -> EngineError {
    EngineError::InvalidAssociationType {
        name: name.to_string(),
        expected,
        actual: actual.variant_name(),
    }
}
