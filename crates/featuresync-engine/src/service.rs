//! `FeatureAttributes`: the read/write facade over one entity mapper.

use crate::builder::OperationBuilder;
use crate::config::EngineConfig;
use crate::convert::{DefaultConverter, DtoConverter};
use crate::error::EngineError;
use crate::executor::{execute, ExecutionReport};
use crate::graph::EntityMapper;
use crate::operation::Operation;
use crate::resolver::PathResolver;
use featuresync_model::{AssociationValue, AttributeMap, AttributeValue, FeatureSchema};
use tracing::debug;

pub struct FeatureAttributes<'m, M, C = DefaultConverter> {
    mapper: &'m M,
    converter: C,
    config: EngineConfig,
}

impl<'m, M: EntityMapper> FeatureAttributes<'m, M> {
    pub fn new(mapper: &'m M) -> Self {
        Self {
            mapper,
            converter: DefaultConverter,
            config: EngineConfig::default(),
        }
    }
}

impl<'m, M: EntityMapper, C: DtoConverter> FeatureAttributes<'m, M, C> {
    pub fn with_converter<D: DtoConverter>(self, converter: D) -> FeatureAttributes<'m, M, D> {
        FeatureAttributes {
            mapper: self.mapper,
            converter,
            config: self.config,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Operation tree that would bring `host` in line with `attributes`.
    /// Reads the graph, writes nothing.
    pub fn plan(
        &self,
        host: &M::Host,
        schema: &FeatureSchema,
        attributes: AttributeMap,
    ) -> Result<Operation<M::Entity>, EngineError> {
        let entity = self.mapper.as_entity(host)?;
        OperationBuilder::new(&self.config).build_root(schema, entity, attributes)
    }

    /// Reconcile `host` with `attributes`: build the full operation tree
    /// first, then execute it.
    pub fn set_attributes(
        &self,
        host: &M::Host,
        schema: &FeatureSchema,
        attributes: AttributeMap,
    ) -> Result<ExecutionReport, EngineError> {
        let plan = self.plan(host, schema, attributes)?;
        debug!(schema = %schema.name, operations = plan.node_count(), "executing operation tree");
        execute(self.mapper, plan)
    }

    pub fn get_attribute(
        &self,
        host: &M::Host,
        schema: &FeatureSchema,
        path: &str,
    ) -> Result<AttributeValue, EngineError> {
        let entity = self.mapper.as_entity(host)?;
        PathResolver::new(&self.config, &self.converter).resolve(schema, Some(&entity), path)
    }

    /// Every attribute of `host` as one association value, identifier included.
    pub fn snapshot(
        &self,
        host: &M::Host,
        schema: &FeatureSchema,
    ) -> Result<AssociationValue, EngineError> {
        let entity = self.mapper.as_entity(host)?;
        PathResolver::new(&self.config, &self.converter).snapshot(schema, &entity)
    }
}
