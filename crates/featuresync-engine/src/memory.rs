//! In-memory entity graph.
//!
//! A small shared store implementing the graph traits. It backs the CLI (which
//! loads and saves it as a JSON [`GraphSnapshot`]) and the engine's own tests.
//! Handles hold the shared store plus a key; the lock is taken per call and
//! never held across calls back into the graph.

use crate::graph::{Entity, EntityCollection, EntityMapper, GraphError};
use featuresync_model::{IdentityKey, Scalar};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

// ============================================================================
// Keys and stored records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(u32);

impl EntityKey {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl std::str::FromStr for EntityKey {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim_start_matches('#').parse().map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntity {
    pub key: EntityKey,
    pub datasource: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Scalar>,
    /// Single-valued references.
    #[serde(default)]
    pub children: BTreeMap<String, EntityKey>,
    /// Collection references, in insertion order.
    #[serde(default)]
    pub collections: BTreeMap<String, Vec<EntityKey>>,
}

impl StoredEntity {
    fn new(key: EntityKey, datasource: &str) -> Self {
        Self {
            key,
            datasource: datasource.to_string(),
            attributes: BTreeMap::new(),
            children: BTreeMap::new(),
            collections: BTreeMap::new(),
        }
    }
}

/// Serializable form of a [`MemoryGraph`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Datasource name to identifier field.
    #[serde(default)]
    pub datasources: BTreeMap<String, String>,
    #[serde(default)]
    pub entities: Vec<StoredEntity>,
}

// ============================================================================
// Graph
// ============================================================================

#[derive(Debug, Default)]
struct GraphState {
    datasources: BTreeMap<String, String>,
    entities: BTreeMap<EntityKey, StoredEntity>,
    next_key: u32,
    /// Writes left before injected failures start; `None` disables injection.
    write_budget: Option<usize>,
}

impl GraphState {
    fn get(&self, key: EntityKey) -> Result<&StoredEntity, GraphError> {
        self.entities
            .get(&key)
            .ok_or_else(|| GraphError::MissingEntity(key.to_string()))
    }

    fn get_mut(&mut self, key: EntityKey) -> Result<&mut StoredEntity, GraphError> {
        self.entities
            .get_mut(&key)
            .ok_or_else(|| GraphError::MissingEntity(key.to_string()))
    }

    fn charge_write(&mut self) -> Result<(), GraphError> {
        match self.write_budget {
            Some(0) => Err(GraphError::Rejected("injected write failure".to_string())),
            Some(ref mut left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn identifier(&self, datasource: &str) -> Result<&str, GraphError> {
        self.datasources
            .get(datasource)
            .map(String::as_str)
            .ok_or_else(|| GraphError::Rejected(format!("unknown datasource `{datasource}`")))
    }

    /// Entity of `datasource` whose stored id names the same entity as `id`.
    /// Stored ids are read in the incoming id's kind first, so a sequence id
    /// `Long(3)` is found again through `String("3")`.
    fn find_by_id(&self, datasource: &str, identifier: &str, id: &Scalar) -> Option<EntityKey> {
        let wanted = id.identity()?;
        self.entities
            .values()
            .filter(|entity| entity.datasource == datasource)
            .find(|entity| {
                entity.attributes.get(identifier).is_some_and(|stored| {
                    let identity = match stored.clone().coerce_to(id.kind()) {
                        Ok(converted) => converted.identity(),
                        Err(_) => stored.identity(),
                    };
                    identity.as_ref() == Some(&wanted)
                })
            })
            .map(|entity| entity.key)
    }

    /// Next sequence value: one past the largest integral id in use. Text ids
    /// holding a number count too, since sequence ids read back as text under
    /// a text identifier.
    fn next_sequence(&self, datasource: &str, identifier: &str) -> Result<i64, GraphError> {
        let max = self
            .entities
            .values()
            .filter(|entity| entity.datasource == datasource)
            .filter_map(|entity| match entity.attributes.get(identifier)?.identity()? {
                IdentityKey::Integer(v) => Some(v),
                IdentityKey::Text(v) => v.trim().parse::<i64>().ok(),
            })
            .max()
            .unwrap_or(0);
        max.checked_add(1).ok_or_else(|| {
            GraphError::Rejected(format!("id sequence of `{datasource}` is exhausted"))
        })
    }

    fn allocate(&mut self, datasource: &str) -> Result<EntityKey, GraphError> {
        let key = EntityKey(self.next_key);
        if self.entities.contains_key(&key) {
            return Err(GraphError::Rejected("entity keys are exhausted".to_string()));
        }
        self.next_key = self.next_key.saturating_add(1);
        self.entities.insert(key, StoredEntity::new(key, datasource));
        Ok(key)
    }
}

/// Shared in-memory entity store. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryGraph {
    state: Arc<RwLock<GraphState>>,
}

impl fmt::Debug for MemoryGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("MemoryGraph")
            .field("datasources", &state.datasources.len())
            .field("entities", &state.entities.len())
            .finish()
    }
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a datasource and the attribute holding its identifier.
    pub fn register_datasource(&self, datasource: impl Into<String>, identifier: impl Into<String>) {
        self.state
            .write()
            .datasources
            .insert(datasource.into(), identifier.into());
    }

    /// Insert an entity with the given attributes. Not subject to write
    /// failure injection.
    pub fn insert<I, K>(&self, datasource: &str, attributes: I) -> Result<EntityKey, GraphError>
    where
        I: IntoIterator<Item = (K, Scalar)>,
        K: Into<String>,
    {
        let mut state = self.state.write();
        let key = state.allocate(datasource)?;
        state
            .get_mut(key)?
            .attributes
            .extend(attributes.into_iter().map(|(name, value)| (name.into(), value)));
        Ok(key)
    }

    /// Handle for `key`. Operations on it fail with `MissingEntity` when the
    /// key is unknown.
    pub fn handle(&self, key: EntityKey) -> MemoryEntity {
        MemoryEntity {
            graph: self.clone(),
            key,
        }
    }

    /// Copy of the stored record.
    pub fn entity(&self, key: EntityKey) -> Option<StoredEntity> {
        self.state.read().entities.get(&key).cloned()
    }

    /// Keys of every entity of `datasource`, in key order.
    pub fn keys_of(&self, datasource: &str) -> Vec<EntityKey> {
        self.state
            .read()
            .entities
            .values()
            .filter(|entity| entity.datasource == datasource)
            .map(|entity| entity.key)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Let `n` more writes succeed, then reject every write after.
    pub fn fail_writes_after(&self, n: usize) {
        self.state.write().write_budget = Some(n);
    }

    pub fn clear_write_failures(&self) {
        self.state.write().write_budget = None;
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let state = self.state.read();
        GraphSnapshot {
            datasources: state.datasources.clone(),
            entities: state.entities.values().cloned().collect(),
        }
    }

    /// Rebuild a graph from a snapshot. Every reference must point at an
    /// entity in the snapshot and keys must be unique.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self, GraphError> {
        let mut entities = BTreeMap::new();
        for entity in snapshot.entities {
            let key = entity.key;
            if entities.insert(key, entity).is_some() {
                return Err(GraphError::Rejected(format!("duplicate entity key {key}")));
            }
        }

        for entity in entities.values() {
            let references = entity
                .children
                .values()
                .chain(entity.collections.values().flatten());
            for target in references {
                if !entities.contains_key(target) {
                    return Err(GraphError::MissingEntity(format!(
                        "{target} (referenced from {})",
                        entity.key
                    )));
                }
            }
        }

        let next_key = entities
            .keys()
            .next_back()
            .map_or(0, |key| key.0.saturating_add(1));
        Ok(Self {
            state: Arc::new(RwLock::new(GraphState {
                datasources: snapshot.datasources,
                entities,
                next_key,
                write_budget: None,
            })),
        })
    }

    fn read<T>(&self, f: impl FnOnce(&GraphState) -> Result<T, GraphError>) -> Result<T, GraphError> {
        let state = self.state.read();
        f(&*state)
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut GraphState) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let mut state = self.state.write();
        state.charge_write()?;
        f(&mut *state)
    }
}

impl EntityMapper for MemoryGraph {
    type Host = EntityKey;
    type Entity = MemoryEntity;

    fn as_entity(&self, host: &EntityKey) -> Result<MemoryEntity, GraphError> {
        self.read(|state| state.get(*host).map(|_| ()))?;
        Ok(self.handle(*host))
    }

    fn find_or_create_entity(
        &self,
        datasource: &str,
        id: Option<&Scalar>,
    ) -> Result<MemoryEntity, GraphError> {
        let id = id.filter(|id| id.identity().is_some());
        let existing = self.read(|state| {
            let identifier = state.identifier(datasource)?;
            Ok(id.and_then(|id| state.find_by_id(datasource, identifier, id)))
        })?;
        if let Some(key) = existing {
            trace!(%datasource, %key, "found existing entity");
            return Ok(self.handle(key));
        }

        let key = self.write(|state| {
            let identifier = state.identifier(datasource)?.to_string();
            let id = match id {
                Some(id) => id.clone(),
                None => Scalar::Long(state.next_sequence(datasource, &identifier)?),
            };
            let key = state.allocate(datasource)?;
            state.get_mut(key)?.attributes.insert(identifier, id);
            Ok(key)
        })?;
        trace!(%datasource, %key, "created entity");
        Ok(self.handle(key))
    }
}

// ============================================================================
// Handles
// ============================================================================

#[derive(Clone)]
pub struct MemoryEntity {
    graph: MemoryGraph,
    key: EntityKey,
}

impl MemoryEntity {
    pub fn key(&self) -> EntityKey {
        self.key
    }
}

impl fmt::Debug for MemoryEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryEntity({})", self.key)
    }
}

impl PartialEq for MemoryEntity {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && Arc::ptr_eq(&self.graph.state, &other.graph.state)
    }
}

impl Entity for MemoryEntity {
    type Collection = MemoryCollection;

    fn id(&self, identifier: &str) -> Result<Option<Scalar>, GraphError> {
        self.attribute(identifier)
    }

    fn attribute(&self, name: &str) -> Result<Option<Scalar>, GraphError> {
        self.graph
            .read(|state| Ok(state.get(self.key)?.attributes.get(name).cloned()))
    }

    fn set_attribute(&self, name: &str, value: Option<Scalar>) -> Result<(), GraphError> {
        self.graph.write(|state| {
            let attributes = &mut state.get_mut(self.key)?.attributes;
            match value {
                Some(value) => {
                    attributes.insert(name.to_string(), value);
                }
                None => {
                    attributes.remove(name);
                }
            }
            Ok(())
        })
    }

    fn child(&self, name: &str) -> Result<Option<Self>, GraphError> {
        let key = self
            .graph
            .read(|state| Ok(state.get(self.key)?.children.get(name).copied()))?;
        Ok(key.map(|key| self.graph.handle(key)))
    }

    fn set_child(&self, name: &str, child: Option<&Self>) -> Result<(), GraphError> {
        self.graph.write(|state| {
            if let Some(child) = child {
                state.get(child.key)?;
            }
            let children = &mut state.get_mut(self.key)?.children;
            match child {
                Some(child) => {
                    children.insert(name.to_string(), child.key);
                }
                None => {
                    children.remove(name);
                }
            }
            Ok(())
        })
    }

    fn child_collection(&self, name: &str) -> Result<Option<MemoryCollection>, GraphError> {
        let present = self
            .graph
            .read(|state| Ok(state.get(self.key)?.collections.contains_key(name)))?;
        Ok(present.then(|| self.collection(name)))
    }

    fn attach_child_collection(&self, name: &str) -> Result<MemoryCollection, GraphError> {
        if let Some(collection) = self.child_collection(name)? {
            return Ok(collection);
        }
        self.graph.write(|state| {
            state
                .get_mut(self.key)?
                .collections
                .insert(name.to_string(), Vec::new());
            Ok(())
        })?;
        Ok(self.collection(name))
    }

    fn detach_child_collection(&self, name: &str) -> Result<(), GraphError> {
        self.graph.write(|state| {
            state.get_mut(self.key)?.collections.remove(name);
            Ok(())
        })
    }
}

impl MemoryEntity {
    fn collection(&self, name: &str) -> MemoryCollection {
        MemoryCollection {
            graph: self.graph.clone(),
            owner: self.key,
            name: name.to_string(),
        }
    }
}

/// Collection reference `name` on `owner`.
#[derive(Clone)]
pub struct MemoryCollection {
    graph: MemoryGraph,
    owner: EntityKey,
    name: String,
}

impl fmt::Debug for MemoryCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryCollection({}.{})", self.owner, self.name)
    }
}

impl MemoryCollection {
    pub fn keys(&self) -> Result<Vec<EntityKey>, GraphError> {
        self.graph.read(|state| {
            Ok(state
                .get(self.owner)?
                .collections
                .get(&self.name)
                .cloned()
                .unwrap_or_default())
        })
    }
}

impl EntityCollection for MemoryCollection {
    type Entity = MemoryEntity;

    fn entities(&self) -> Result<Vec<MemoryEntity>, GraphError> {
        Ok(self
            .keys()?
            .into_iter()
            .map(|key| self.graph.handle(key))
            .collect())
    }

    fn add_entity(&self, entity: &MemoryEntity) -> Result<(), GraphError> {
        self.graph.write(|state| {
            state.get(entity.key)?;
            let members = state
                .get_mut(self.owner)?
                .collections
                .entry(self.name.clone())
                .or_default();
            if !members.contains(&entity.key) {
                members.push(entity.key);
            }
            Ok(())
        })
    }

    fn remove_entity(&self, entity: &MemoryEntity) -> Result<(), GraphError> {
        self.graph.write(|state| {
            if let Some(members) = state.get_mut(self.owner)?.collections.get_mut(&self.name) {
                members.retain(|key| *key != entity.key);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> MemoryGraph {
        let graph = MemoryGraph::new();
        graph.register_datasource("parcels", "fid");
        graph.register_datasource("owners", "owner_id");
        graph
    }

    #[test]
    fn find_or_create_reuses_existing_ids() {
        let graph = graph();
        let key = graph.insert("owners", [("owner_id", Scalar::Long(7))]).unwrap();

        let found = graph
            .find_or_create_entity("owners", Some(&Scalar::Integer(7)))
            .unwrap();
        assert_eq!(found.key(), key);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn find_or_create_without_id_uses_sequence() {
        let graph = graph();
        graph.insert("owners", [("owner_id", Scalar::Long(4))]).unwrap();

        let created = graph.find_or_create_entity("owners", None).unwrap();
        assert_eq!(created.id("owner_id").unwrap(), Some(Scalar::Long(5)));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn unknown_datasource_is_rejected() {
        let graph = graph();
        let err = graph.find_or_create_entity("roads", None).unwrap_err();
        assert!(matches!(err, GraphError::Rejected(msg) if msg.contains("roads")));
    }

    #[test]
    fn collections_attach_add_and_remove() {
        let graph = graph();
        let parcel = graph.handle(graph.insert("parcels", [("fid", Scalar::Long(1))]).unwrap());
        let owner = graph.handle(graph.insert("owners", [("owner_id", Scalar::Long(1))]).unwrap());

        assert!(parcel.child_collection("owners").unwrap().is_none());
        let collection = parcel.attach_child_collection("owners").unwrap();
        collection.add_entity(&owner).unwrap();
        collection.add_entity(&owner).unwrap();
        assert_eq!(collection.keys().unwrap(), vec![owner.key()]);

        collection.remove_entity(&owner).unwrap();
        assert!(collection.entities().unwrap().is_empty());

        parcel.detach_child_collection("owners").unwrap();
        assert!(parcel.child_collection("owners").unwrap().is_none());
    }

    #[test]
    fn injected_failures_start_after_budget() {
        let graph = graph();
        let parcel = graph.handle(graph.insert("parcels", [("fid", Scalar::Long(1))]).unwrap());

        graph.fail_writes_after(1);
        parcel.set_attribute("name", Some(Scalar::from("a"))).unwrap();
        let err = parcel.set_attribute("name", Some(Scalar::from("b"))).unwrap_err();
        assert!(matches!(err, GraphError::Rejected(_)));
        assert_eq!(parcel.attribute("name").unwrap(), Some(Scalar::from("a")));

        graph.clear_write_failures();
        parcel.set_attribute("name", None).unwrap();
        assert_eq!(parcel.attribute("name").unwrap(), None);
    }

    #[test]
    fn snapshot_round_trip_preserves_references() {
        let graph = graph();
        let parcel = graph.handle(graph.insert("parcels", [("fid", Scalar::Long(1))]).unwrap());
        let owner = graph.handle(graph.insert("owners", [("owner_id", Scalar::Long(9))]).unwrap());
        parcel.set_child("primary_owner", Some(&owner)).unwrap();

        let json = serde_json::to_string(&graph.snapshot()).unwrap();
        let restored = MemoryGraph::from_snapshot(serde_json::from_str(&json).unwrap()).unwrap();

        let child = restored.handle(parcel.key()).child("primary_owner").unwrap().unwrap();
        assert_eq!(child.key(), owner.key());
        let next = restored.insert("owners", Vec::<(String, Scalar)>::new()).unwrap();
        assert_eq!(next.get(), 2);
    }

    #[test]
    fn snapshot_with_dangling_reference_is_rejected() {
        let mut entity = StoredEntity::new(EntityKey::new(0), "parcels");
        entity.children.insert("owner".to_string(), EntityKey::new(5));
        let snapshot = GraphSnapshot {
            datasources: BTreeMap::new(),
            entities: vec![entity],
        };
        assert!(matches!(
            MemoryGraph::from_snapshot(snapshot),
            Err(GraphError::MissingEntity(_))
        ));
    }

    #[test]
    fn exhausted_entity_keys_are_rejected() {
        let snapshot = GraphSnapshot {
            datasources: BTreeMap::from([("owners".to_string(), "owner_id".to_string())]),
            entities: vec![StoredEntity::new(EntityKey::new(u32::MAX), "owners")],
        };
        let graph = MemoryGraph::from_snapshot(snapshot).unwrap();

        let err = graph.find_or_create_entity("owners", None).unwrap_err();
        assert!(matches!(err, GraphError::Rejected(msg) if msg.contains("exhausted")));
        assert!(graph.insert("owners", [("owner_id", Scalar::Long(1))]).is_err());
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.entity(EntityKey::new(u32::MAX)).unwrap().attributes.len(), 0);
    }

    #[test]
    fn last_free_entity_key_is_still_usable() {
        let snapshot = GraphSnapshot {
            datasources: BTreeMap::from([("owners".to_string(), "owner_id".to_string())]),
            entities: vec![StoredEntity::new(EntityKey::new(u32::MAX - 1), "owners")],
        };
        let graph = MemoryGraph::from_snapshot(snapshot).unwrap();

        let key = graph.insert("owners", [("owner_id", Scalar::Long(1))]).unwrap();
        assert_eq!(key, EntityKey::new(u32::MAX));
        assert!(graph.insert("owners", [("owner_id", Scalar::Long(2))]).is_err());
    }

    #[test]
    fn exhausted_id_sequence_is_rejected() {
        let graph = graph();
        graph.insert("owners", [("owner_id", Scalar::Long(i64::MAX))]).unwrap();

        let err = graph.find_or_create_entity("owners", None).unwrap_err();
        assert!(matches!(err, GraphError::Rejected(msg) if msg.contains("sequence")));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn sequence_ids_are_found_through_text_ids() {
        let graph = graph();
        let created = graph.find_or_create_entity("owners", None).unwrap();
        assert_eq!(created.id("owner_id").unwrap(), Some(Scalar::Long(1)));

        let found = graph
            .find_or_create_entity("owners", Some(&Scalar::from("1")))
            .unwrap();
        assert_eq!(found.key(), created.key());

        graph.insert("owners", [("owner_id", Scalar::from("7"))]).unwrap();
        let next = graph.find_or_create_entity("owners", None).unwrap();
        assert_eq!(next.id("owner_id").unwrap(), Some(Scalar::Long(8)));
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn entity_keys_parse_with_or_without_hash() {
        assert_eq!("#3".parse::<EntityKey>().unwrap(), EntityKey::new(3));
        assert_eq!("12".parse::<EntityKey>().unwrap(), EntityKey::new(12));
    }
}
