//! Operation tree: the data-only plan produced by the builder.
//!
//! Nodes carry what to change, never how. Existing entities are referenced by
//! their handles; entities that still have to be resolved carry the datasource
//! and id the executor hands to the mapper. A tree is built once, executed
//! once and dropped.

use featuresync_model::{IdentityKey, Scalar};
use std::fmt;

/// One primitive write on the entity of the enclosing node.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub value: Option<Scalar>,
}

/// Primitive writes plus nested operations for one entity level.
#[derive(Debug, Clone)]
pub struct EntityUpdate<E> {
    pub assignments: Vec<Assignment>,
    pub children: Vec<Operation<E>>,
}

impl<E> Default for EntityUpdate<E> {
    fn default() -> Self {
        Self {
            assignments: Vec::new(),
            children: Vec::new(),
        }
    }
}

impl<E> EntityUpdate<E> {
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty() && self.children.is_empty()
    }

    pub fn assignment(&self, name: &str) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone)]
pub enum Operation<E> {
    /// Root level: update the entity the caller's object maps to.
    UpdateEntity { target: E, update: EntityUpdate<E> },

    /// Resolve (or create) an entity and link it as the named child.
    CreateManyToOne {
        attribute: String,
        datasource: String,
        id: Option<Scalar>,
        update: EntityUpdate<E>,
    },

    /// Reconcile the current child in place.
    UpdateManyToOne {
        attribute: String,
        target: E,
        update: EntityUpdate<E>,
    },

    /// Clear the child reference. The orphan itself is not deleted.
    DeleteManyToOne { attribute: String },

    /// Detach the whole collection reference.
    DeleteOneToMany { attribute: String },

    /// Resolve (or create) an entity and append it to the collection.
    AddManyValue {
        attribute: String,
        datasource: String,
        id: Option<Scalar>,
        update: EntityUpdate<E>,
    },

    /// Reconcile a collection member in place.
    UpdateManyValue {
        attribute: String,
        id: IdentityKey,
        target: E,
        update: EntityUpdate<E>,
    },

    /// Remove a collection member that the incoming list no longer names.
    RemoveManyValue {
        attribute: String,
        id: IdentityKey,
        target: E,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    UpdateEntity,
    CreateManyToOne,
    UpdateManyToOne,
    DeleteManyToOne,
    DeleteOneToMany,
    AddManyValue,
    UpdateManyValue,
    RemoveManyValue,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UpdateEntity => "update_entity",
            Self::CreateManyToOne => "create_many_to_one",
            Self::UpdateManyToOne => "update_many_to_one",
            Self::DeleteManyToOne => "delete_many_to_one",
            Self::DeleteOneToMany => "delete_one_to_many",
            Self::AddManyValue => "add_many_value",
            Self::UpdateManyValue => "update_many_value",
            Self::RemoveManyValue => "remove_many_value",
        }
    }

    /// Whether the operation changes graph structure rather than updating
    /// entities in place.
    pub const fn is_structural(self) -> bool {
        !matches!(
            self,
            Self::UpdateEntity | Self::UpdateManyToOne | Self::UpdateManyValue
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<E> Operation<E> {
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::UpdateEntity { .. } => OperationKind::UpdateEntity,
            Self::CreateManyToOne { .. } => OperationKind::CreateManyToOne,
            Self::UpdateManyToOne { .. } => OperationKind::UpdateManyToOne,
            Self::DeleteManyToOne { .. } => OperationKind::DeleteManyToOne,
            Self::DeleteOneToMany { .. } => OperationKind::DeleteOneToMany,
            Self::AddManyValue { .. } => OperationKind::AddManyValue,
            Self::UpdateManyValue { .. } => OperationKind::UpdateManyValue,
            Self::RemoveManyValue { .. } => OperationKind::RemoveManyValue,
        }
    }

    /// Attribute of the parent entity this operation acts on.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            Self::UpdateEntity { .. } => None,
            Self::CreateManyToOne { attribute, .. }
            | Self::UpdateManyToOne { attribute, .. }
            | Self::DeleteManyToOne { attribute }
            | Self::DeleteOneToMany { attribute }
            | Self::AddManyValue { attribute, .. }
            | Self::UpdateManyValue { attribute, .. }
            | Self::RemoveManyValue { attribute, .. } => Some(attribute),
        }
    }

    /// Identity of the entity the operation targets, when known up front.
    pub fn identity(&self) -> Option<IdentityKey> {
        match self {
            Self::UpdateManyValue { id, .. } | Self::RemoveManyValue { id, .. } => Some(id.clone()),
            Self::CreateManyToOne { id, .. } | Self::AddManyValue { id, .. } => {
                id.as_ref().and_then(Scalar::identity)
            }
            _ => None,
        }
    }

    pub fn update(&self) -> Option<&EntityUpdate<E>> {
        match self {
            Self::UpdateEntity { update, .. }
            | Self::CreateManyToOne { update, .. }
            | Self::UpdateManyToOne { update, .. }
            | Self::AddManyValue { update, .. }
            | Self::UpdateManyValue { update, .. } => Some(update),
            Self::DeleteManyToOne { .. }
            | Self::DeleteOneToMany { .. }
            | Self::RemoveManyValue { .. } => None,
        }
    }

    pub fn children(&self) -> &[Operation<E>] {
        match self.update() {
            Some(update) => &update.children,
            None => &[],
        }
    }

    /// This node and all descendants, pre-order.
    pub fn descendants(&self) -> Vec<&Operation<E>> {
        let mut out = vec![self];
        for child in self.children() {
            out.extend(child.descendants());
        }
        out
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(Operation::node_count).sum::<usize>()
    }

    /// Multi-line rendering of the tree for logs and the CLI.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        self.render(0, &mut out);
        out
    }

    fn render(&self, depth: usize, out: &mut String) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(self.kind().as_str());
        if let Some(attribute) = self.attribute() {
            out.push_str(&format!(" {attribute}"));
        }
        if let Some(id) = self.identity() {
            out.push_str(&format!(" #{id}"));
        }
        if let Some(update) = self.update() {
            for assignment in &update.assignments {
                let value = match &assignment.value {
                    Some(value) => value.to_string(),
                    None => "null".to_string(),
                };
                out.push_str(&format!(" {}={value}", assignment.name));
            }
        }
        out.push('\n');
        for child in self.children() {
            child.render(depth + 1, out);
        }
    }
}

impl<E> fmt::Display for Operation<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.summary().trim_end())
    }
}
