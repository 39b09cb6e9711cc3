//! Operation executor.
//!
//! Walks an operation tree and applies it through the entity graph traits.
//! There is no rollback: when an operation fails, everything applied before it
//! stays applied and the error reports how many operations had completed.
//! Atomicity belongs to the caller's transaction.

use crate::error::EngineError;
use crate::graph::{Entity, EntityCollection, EntityMapper, GraphError};
use crate::operation::{EntityUpdate, Operation, OperationKind};
use featuresync_model::{IdentityKey, Scalar};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// What an execution pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Operations that completed, subtrees included.
    pub applied: usize,
    /// Primitive attribute writes.
    pub assignments: usize,
    /// Entities resolved through `find_or_create_entity`.
    pub resolved: usize,
    pub by_kind: BTreeMap<OperationKind, usize>,
}

impl ExecutionReport {
    pub fn count(&self, kind: OperationKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }

    /// Whether any structural operation (create, add, delete, remove) ran.
    pub fn changed_structure(&self) -> bool {
        self.by_kind
            .iter()
            .any(|(kind, count)| kind.is_structural() && *count > 0)
    }
}

/// Apply `operation` against the mapper's graph.
///
/// The root must be an `UpdateEntity`; every other kind acts relative to a
/// parent entity.
pub fn execute<M: EntityMapper>(
    mapper: &M,
    operation: Operation<M::Entity>,
) -> Result<ExecutionReport, EngineError> {
    let mut executor = Executor {
        mapper,
        report: ExecutionReport::default(),
    };

    let outcome = match operation {
        Operation::UpdateEntity { target, update } => executor
            .apply_update(&target, update)
            .map(|()| executor.completed(OperationKind::UpdateEntity)),
        other => Err(EngineError::Graph(GraphError::Rejected(format!(
            "{} needs a parent entity and cannot be executed as a root",
            other.kind()
        )))),
    };

    match outcome {
        Ok(()) => {
            info!(
                applied = executor.report.applied,
                assignments = executor.report.assignments,
                resolved = executor.report.resolved,
                "operation tree applied"
            );
            Ok(executor.report)
        }
        Err(source) => Err(EngineError::Execution {
            applied: executor.report.applied,
            source: Box::new(source),
        }),
    }
}

/// Collection member an operation acts on, for error paths.
enum Member {
    Index(usize),
    Id(IdentityKey),
}

struct Executor<'m, M: EntityMapper> {
    mapper: &'m M,
    report: ExecutionReport,
}

impl<M: EntityMapper> Executor<'_, M> {
    fn completed(&mut self, kind: OperationKind) {
        self.report.applied += 1;
        *self.report.by_kind.entry(kind).or_insert(0) += 1;
    }

    fn apply_update(
        &mut self,
        entity: &M::Entity,
        update: EntityUpdate<M::Entity>,
    ) -> Result<(), EngineError> {
        for assignment in update.assignments {
            entity
                .set_attribute(&assignment.name, assignment.value)
                .map_err(|err| EngineError::from(err).with_field(&assignment.name))?;
            self.report.assignments += 1;
        }

        // Added and updated members follow the incoming list, so counting them
        // per attribute recovers the index the builder reports.
        let mut positions: HashMap<String, usize> = HashMap::new();
        for child in update.children {
            let kind = child.kind();
            let attribute = child.attribute().unwrap_or_default().to_string();
            let member = match &child {
                Operation::AddManyValue { .. } | Operation::UpdateManyValue { .. } => {
                    let position = positions.entry(attribute.clone()).or_insert(0);
                    *position += 1;
                    Some(Member::Index(*position - 1))
                }
                Operation::RemoveManyValue { id, .. } => Some(Member::Id(id.clone())),
                _ => None,
            };
            self.run(entity, child).map_err(|err| {
                let err = match &member {
                    Some(Member::Index(index)) => err.with_index(*index),
                    Some(Member::Id(id)) => err.with_member(id),
                    None => err,
                };
                err.with_field(&attribute)
            })?;
            self.completed(kind);
        }

        Ok(())
    }

    fn resolve(&mut self, datasource: &str, id: Option<&Scalar>) -> Result<M::Entity, EngineError> {
        let entity = self.mapper.find_or_create_entity(datasource, id)?;
        self.report.resolved += 1;
        Ok(entity)
    }

    fn run(&mut self, parent: &M::Entity, operation: Operation<M::Entity>) -> Result<(), EngineError> {
        debug!(kind = %operation.kind(), attribute = operation.attribute().unwrap_or(""), "applying operation");

        match operation {
            Operation::UpdateEntity { target, update }
            | Operation::UpdateManyToOne { target, update, .. }
            | Operation::UpdateManyValue { target, update, .. } => self.apply_update(&target, update),

            Operation::CreateManyToOne {
                attribute,
                datasource,
                id,
                update,
            } => {
                let entity = self.resolve(&datasource, id.as_ref())?;
                self.apply_update(&entity, update)?;
                parent.set_child(&attribute, Some(&entity))?;
                Ok(())
            }

            Operation::AddManyValue {
                attribute,
                datasource,
                id,
                update,
            } => {
                let entity = self.resolve(&datasource, id.as_ref())?;
                self.apply_update(&entity, update)?;
                parent.attach_child_collection(&attribute)?.add_entity(&entity)?;
                Ok(())
            }

            Operation::DeleteManyToOne { attribute } => {
                parent.set_child(&attribute, None)?;
                Ok(())
            }

            Operation::DeleteOneToMany { attribute } => {
                parent.detach_child_collection(&attribute)?;
                Ok(())
            }

            Operation::RemoveManyValue { attribute, target, .. } => {
                if let Some(collection) = parent.child_collection(&attribute)? {
                    collection.remove_entity(&target)?;
                }
                Ok(())
            }
        }
    }
}
