//! Entity graph abstraction.
//!
//! The engine never sees the persistence technology. It reads and mutates
//! entities through these traits only. Handles are cheap to clone and mutate
//! through `&self`, the way session-bound ORM proxies do; the host is expected
//! to wrap a whole build + execute pass in its own transaction.

use featuresync_model::{IdentityKey, PrimitiveAttributeInfo, Scalar};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("entity {0} does not exist")]
    MissingEntity(String),

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

/// Handle to one persisted entity.
pub trait Entity: Clone + fmt::Debug {
    type Collection: EntityCollection<Entity = Self>;

    /// Identifier value stored under `identifier`.
    fn id(&self, identifier: &str) -> Result<Option<Scalar>, GraphError>;

    fn attribute(&self, name: &str) -> Result<Option<Scalar>, GraphError>;

    fn set_attribute(&self, name: &str, value: Option<Scalar>) -> Result<(), GraphError>;

    fn child(&self, name: &str) -> Result<Option<Self>, GraphError>;

    /// Point the named reference at `child`, or clear it with `None`.
    fn set_child(&self, name: &str, child: Option<&Self>) -> Result<(), GraphError>;

    fn child_collection(&self, name: &str) -> Result<Option<Self::Collection>, GraphError>;

    /// Existing collection, or a new empty one attached under `name`.
    fn attach_child_collection(&self, name: &str) -> Result<Self::Collection, GraphError>;

    /// Drop the collection reference. Member entities are left alone.
    fn detach_child_collection(&self, name: &str) -> Result<(), GraphError>;
}

pub trait EntityCollection {
    type Entity;

    fn entities(&self) -> Result<Vec<Self::Entity>, GraphError>;

    fn add_entity(&self, entity: &Self::Entity) -> Result<(), GraphError>;

    fn remove_entity(&self, entity: &Self::Entity) -> Result<(), GraphError>;
}

/// Entry point into the host's persistence layer.
pub trait EntityMapper {
    /// Host-side object the caller hands in (a feature, a row key, ...).
    type Host: ?Sized;
    type Entity: Entity;

    fn as_entity(&self, host: &Self::Host) -> Result<Self::Entity, GraphError>;

    /// Entity of `datasource` with the given id, created when it does not
    /// exist yet. Without an id a fresh entity is always created.
    fn find_or_create_entity(
        &self,
        datasource: &str,
        id: Option<&Scalar>,
    ) -> Result<Self::Entity, GraphError>;
}

/// Identity of `entity` under `identifier`, read in the identifier's declared
/// kind so that a stored `Long(1)` matches an incoming `String("1")` when the
/// schema declares a text identifier. Stored values that do not convert keep
/// their own identity.
pub fn identity_of<E: Entity>(
    entity: &E,
    identifier: &PrimitiveAttributeInfo,
) -> Result<Option<IdentityKey>, GraphError> {
    let Some(stored) = entity.id(&identifier.name)? else {
        return Ok(None);
    };
    let identity = match stored.clone().coerce_to(identifier.kind) {
        Ok(converted) => converted.identity(),
        Err(_) => stored.identity(),
    };
    Ok(identity)
}
