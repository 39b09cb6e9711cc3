//! Featuresync reconciliation engine
//!
//! Synchronizes a nested attribute tree with a persisted entity graph:
//!
//! ```text
//! ┌──────────────┐   build    ┌────────────────┐  execute   ┌──────────────┐
//! │ AttributeMap │──────────►│ Operation tree │──────────►│ Entity graph │
//! │  (incoming)  │  (reads)   │  (data only)   │  (writes)  │   (mapper)   │
//! └──────────────┘            └────────────────┘            └──────┬───────┘
//!        ▲                                                         │
//!        └──────────────── PathResolver (get_attribute) ───────────┘
//! ```
//!
//! ## Key Pieces
//!
//! - **Builder**: diffs incoming values against the graph; one-to-many lists
//!   are reconciled by identity (update / add / remove)
//! - **Executor**: applies a tree depth-first and reports partial failure
//! - **Resolver**: reads values along `a.b.c` paths, tolerant of absent links
//! - **MemoryGraph**: shared in-memory graph implementing the traits
//!
//! The engine never sees a persistence technology; hosts implement
//! [`EntityMapper`], [`Entity`] and [`EntityCollection`].

pub mod builder;
pub mod config;
pub mod convert;
pub mod error;
pub mod executor;
pub mod graph;
pub mod memory;
pub mod operation;
pub mod resolver;
pub mod service;


pub use builder::OperationBuilder;
pub use config::EngineConfig;
pub use convert::{DefaultConverter, DtoConverter};
pub use error::EngineError;
pub use executor::{execute, ExecutionReport};
pub use graph::{Entity, EntityCollection, EntityMapper, GraphError};
pub use memory::{EntityKey, GraphSnapshot, MemoryCollection, MemoryEntity, MemoryGraph, StoredEntity};
pub use operation::{Assignment, EntityUpdate, Operation, OperationKind};
pub use resolver::PathResolver;
pub use service::FeatureAttributes;

use featuresync_model::{AttributeMap, AttributeValue, FeatureSchema};

// ============================================================================
// Convenience Functions
// ============================================================================

/// Reconcile `host` with `attributes` using the default configuration.
pub fn set_attributes<M: EntityMapper>(
    host: &M::Host,
    schema: &FeatureSchema,
    mapper: &M,
    attributes: AttributeMap,
) -> Result<ExecutionReport, EngineError> {
    FeatureAttributes::new(mapper).set_attributes(host, schema, attributes)
}

/// Read the value at `path` using the default configuration.
pub fn get_attribute<M: EntityMapper>(
    host: &M::Host,
    schema: &FeatureSchema,
    mapper: &M,
    path: &str,
) -> Result<AttributeValue, EngineError> {
    FeatureAttributes::new(mapper).get_attribute(host, schema, path)
}
