//! Property-based tests for one-to-many reconciliation
//!
//! 1. The collection ends up holding exactly the incoming ids
//! 2. Members present on both sides keep their entity identity
//! 3. Re-applying the same input only updates

use featuresync_engine::{
    Entity, EntityCollection, EntityKey, FeatureAttributes, MemoryGraph, OperationKind,
};
use featuresync_model::{
    AssociationValue, AttributeInfo, AttributeMap, AttributeValue, FeatureSchema, PrimitiveAttribute,
    PrimitiveAttributeInfo, PrimitiveKind, Scalar,
};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Fixtures
// ============================================================================

fn schema() -> FeatureSchema {
    let member = FeatureSchema::new("member", PrimitiveAttributeInfo::new("id", PrimitiveKind::Long, false))
        .with_attribute(AttributeInfo::primitive("name", PrimitiveKind::String));
    FeatureSchema::new("group", PrimitiveAttributeInfo::new("fid", PrimitiveKind::Long, false))
        .with_attribute(AttributeInfo::one_to_many("members", member))
}

fn graph_with_members(existing: &BTreeSet<i64>) -> (MemoryGraph, EntityKey) {
    let graph = MemoryGraph::new();
    graph.register_datasource("group", "fid");
    graph.register_datasource("member", "id");

    let group = graph.insert("group", [("fid", Scalar::Long(1))]).unwrap();
    let members = graph.handle(group).attach_child_collection("members").unwrap();
    for id in existing {
        let key = graph.insert("member", [("id", Scalar::Long(*id))]).unwrap();
        members.add_entity(&graph.handle(key)).unwrap();
    }
    (graph, group)
}

fn input(incoming: &BTreeMap<i64, String>) -> AttributeMap {
    let entries = incoming
        .iter()
        .map(|(id, name)| {
            let mut attributes = AttributeMap::new();
            attributes.insert("name".to_string(), AttributeValue::primitive(name.as_str()));
            AssociationValue::new(Some(PrimitiveAttribute::of(*id)), attributes)
        })
        .collect();
    let mut map = AttributeMap::new();
    map.insert("members".to_string(), AttributeValue::one_to_many(Some(entries)));
    map
}

/// Member id to entity key, as currently linked.
fn linked(graph: &MemoryGraph, group: EntityKey) -> BTreeMap<i64, EntityKey> {
    let collection = graph
        .handle(group)
        .child_collection("members")
        .unwrap()
        .unwrap();
    collection
        .entities()
        .unwrap()
        .into_iter()
        .map(|member| {
            let id = member.id("id").unwrap().and_then(|id| id.as_i64()).unwrap();
            (id, member.key())
        })
        .collect()
}

// ============================================================================
// Strategies
// ============================================================================

fn id_set_strategy() -> impl Strategy<Value = BTreeSet<i64>> {
    prop::collection::btree_set(1i64..30, 0..8)
}

fn incoming_strategy() -> impl Strategy<Value = BTreeMap<i64, String>> {
    prop::collection::btree_map(1i64..30, "[a-z]{1,6}", 0..8)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_collection_matches_incoming_ids(
        existing in id_set_strategy(),
        incoming in incoming_strategy(),
    ) {
        let (graph, group) = graph_with_members(&existing);
        let before = linked(&graph, group);
        let schema = schema();

        let report = FeatureAttributes::new(&graph)
            .set_attributes(&group, &schema, input(&incoming))
            .unwrap();

        let after = linked(&graph, group);
        let incoming_ids: BTreeSet<i64> = incoming.keys().copied().collect();
        prop_assert_eq!(after.keys().copied().collect::<BTreeSet<_>>(), incoming_ids.clone());

        for (id, key) in &after {
            if let Some(previous) = before.get(id) {
                prop_assert_eq!(previous, key);
            }
        }

        let kept = existing.intersection(&incoming_ids).count();
        prop_assert_eq!(report.count(OperationKind::UpdateManyValue), kept);
        prop_assert_eq!(report.count(OperationKind::RemoveManyValue), existing.len() - kept);
        prop_assert_eq!(report.count(OperationKind::AddManyValue), incoming_ids.len() - kept);
    }

    #[test]
    fn prop_second_pass_is_update_only(
        existing in id_set_strategy(),
        incoming in incoming_strategy(),
    ) {
        let (graph, group) = graph_with_members(&existing);
        let service = FeatureAttributes::new(&graph);
        let schema = schema();

        service.set_attributes(&group, &schema, input(&incoming)).unwrap();
        let plan = service.plan(&group, &schema, input(&incoming)).unwrap();

        prop_assert!(plan.descendants().iter().all(|op| !op.kind().is_structural()));
        prop_assert_eq!(plan.children().len(), incoming.len());
    }
}
