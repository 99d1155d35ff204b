//! Embedded in-memory graph store.
//!
//! Reference backend: lock-guarded hash maps keyed by node id and by edge
//! key. Implements the full merge/fold semantics of the store port, so it
//! doubles as the executable definition of those semantics for other
//! backends.

use std::collections::hash_map::Entry;

use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::ports::{ContentGraphStore, DependencyConfig, GraphStats};
use crate::schema::SchemaRegistry;
use crate::shared::models::{
    node_id_of, ContentNode, ContentType, Marketplace, MarketplaceSet, NodeId, Relationship,
    RelationshipKind, Result, StoredRelationship,
};

type RelKey = (NodeId, RelationshipKind, NodeId);

#[derive(Default)]
pub struct InMemoryGraphStore {
    nodes: RwLock<AHashMap<NodeId, ContentNode>>,
    relationships: RwLock<AHashMap<RelKey, StoredRelationship>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Merge one edge occurrence into the edge map. Returns `true` when the edge
/// was created rather than folded into an existing one.
fn merge_edge(
    edges: &mut AHashMap<RelKey, StoredRelationship>,
    kind: RelationshipKind,
    source: NodeId,
    target: NodeId,
    mandatorily: bool,
    deprecated: bool,
    marketplaces: Option<&MarketplaceSet>,
) -> bool {
    match edges.entry((source.clone(), kind, target.clone())) {
        Entry::Occupied(mut occupied) => {
            occupied.get_mut().fold(mandatorily, deprecated, marketplaces);
            false
        }
        Entry::Vacant(vacant) => {
            let mut edge = StoredRelationship::new(kind, source, target);
            edge.fold(mandatorily, deprecated, marketplaces);
            vacant.insert(edge);
            true
        }
    }
}

#[async_trait]
impl ContentGraphStore for InMemoryGraphStore {
    async fn ensure_schema(&self) -> Result<()> {
        // Nothing to materialize for a map-backed store; constraints are
        // enforced per batch at upsert time from the same registry.
        let registry = SchemaRegistry::global();
        debug!(
            node_kinds = registry.node_schemas().len(),
            relationship_kinds = registry.relationship_schemas().len(),
            "schema ready"
        );
        Ok(())
    }

    async fn upsert_nodes(
        &self,
        content_type: ContentType,
        batch: Vec<ContentNode>,
    ) -> Result<usize> {
        SchemaRegistry::global().validate_nodes(content_type, &batch)?;

        let mut nodes = self.nodes.write();
        let count = batch.len();
        for node in batch {
            match nodes.entry(node.node_id.clone()) {
                Entry::Occupied(mut occupied) => {
                    let existing = occupied.get_mut();
                    existing.id = node.id;
                    existing.content_type = node.content_type;
                    existing.name = node.name;
                    existing.deprecated = node.deprecated;
                    existing.marketplaces = node.marketplaces;
                    existing.fromversion = node.fromversion;
                    existing.toversion = node.toversion;
                    existing.file_path = node.file_path;
                    // New keys overwrite old, untouched keys survive
                    for (key, value) in node.attrs {
                        existing.attrs.insert(key, value);
                    }
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(node);
                }
            }
        }
        Ok(count)
    }

    async fn upsert_relationships(
        &self,
        kind: RelationshipKind,
        batch: Vec<Relationship>,
    ) -> Result<usize> {
        SchemaRegistry::global().validate_relationships(kind, &batch)?;

        let mut nodes = self.nodes.write();
        let mut edges = self.relationships.write();
        let mut touched = 0;

        for rel in batch {
            if !nodes.contains_key(&rel.source_node_id) {
                warn!(source = %rel.source_node_id, kind = %kind, "skipping edge from unknown source");
                continue;
            }
            match kind {
                RelationshipKind::HasCommand => {
                    let command_node_id = node_id_of(ContentType::Command, &rel.target);
                    match nodes.entry(command_node_id.clone()) {
                        Entry::Occupied(occupied) => {
                            // Never overwritten, only widened
                            occupied
                                .into_mut()
                                .marketplaces
                                .union_with(&rel.source_marketplaces);
                        }
                        Entry::Vacant(vacant) => {
                            vacant.insert(
                                ContentNode::new(
                                    ContentType::Command,
                                    rel.target.clone(),
                                    rel.target.clone(),
                                )
                                .with_marketplaces(rel.source_marketplaces.clone()),
                            );
                        }
                    }
                    merge_edge(
                        &mut edges,
                        RelationshipKind::HasCommand,
                        rel.source_node_id,
                        command_node_id,
                        false,
                        rel.deprecated,
                        None,
                    );
                    touched += 1;
                }
                RelationshipKind::UsesCommandOrScript => {
                    let candidates: Vec<NodeId> = nodes
                        .values()
                        .filter(|n| {
                            matches!(
                                n.content_type,
                                ContentType::Command | ContentType::Script
                            ) && n.id == rel.target
                                && n.marketplaces.intersects(&rel.source_marketplaces)
                        })
                        .map(|n| n.node_id.clone())
                        .collect();
                    if candidates.is_empty() {
                        debug!(
                            source = %rel.source_node_id,
                            target = %rel.target,
                            "dependency not resolvable in source marketplaces"
                        );
                    }
                    for candidate in candidates {
                        // Stored under USES once resolved
                        merge_edge(
                            &mut edges,
                            RelationshipKind::Uses,
                            rel.source_node_id.clone(),
                            candidate,
                            rel.mandatorily,
                            rel.deprecated,
                            None,
                        );
                        touched += 1;
                    }
                }
                RelationshipKind::Uses => {
                    let resolvable = nodes
                        .get(&rel.target)
                        .map(|t| t.marketplaces.intersects(&rel.source_marketplaces))
                        .unwrap_or(false);
                    if !resolvable {
                        debug!(
                            source = %rel.source_node_id,
                            target = %rel.target,
                            "dependency not resolvable in source marketplaces"
                        );
                        continue;
                    }
                    merge_edge(
                        &mut edges,
                        RelationshipKind::Uses,
                        rel.source_node_id,
                        rel.target,
                        rel.mandatorily,
                        rel.deprecated,
                        None,
                    );
                    touched += 1;
                }
                RelationshipKind::InPack => {
                    if !nodes.contains_key(&rel.target) {
                        warn!(target = %rel.target, "skipping IN_PACK edge to unknown pack");
                        continue;
                    }
                    merge_edge(
                        &mut edges,
                        RelationshipKind::InPack,
                        rel.source_node_id,
                        rel.target,
                        false,
                        rel.deprecated,
                        None,
                    );
                    touched += 1;
                }
                RelationshipKind::DependsOn => {
                    let common = match (nodes.get(&rel.source_node_id), nodes.get(&rel.target)) {
                        (Some(a), Some(b)) => a.marketplaces.intersection(&b.marketplaces),
                        _ => continue,
                    };
                    merge_edge(
                        &mut edges,
                        RelationshipKind::DependsOn,
                        rel.source_node_id,
                        rel.target,
                        rel.mandatorily,
                        false,
                        Some(&common),
                    );
                    touched += 1;
                }
            }
        }
        Ok(touched)
    }

    async fn run_marketplace_pass(&self, marketplace: Marketplace) -> Result<usize> {
        // Compute removals against the pre-pass state, then apply. Iteration
        // order within the pass cannot affect the outcome.
        let to_remove: Vec<NodeId> = {
            let nodes = self.nodes.read();
            let edges = self.relationships.read();

            let mut mandatory_uses: AHashMap<&str, Vec<&str>> = AHashMap::new();
            for edge in edges.values() {
                if edge.kind == RelationshipKind::Uses && edge.mandatorily {
                    mandatory_uses
                        .entry(edge.source_node_id.as_str())
                        .or_default()
                        .push(edge.target_node_id.as_str());
                }
            }

            nodes
                .values()
                .filter(|node| node.is_in(marketplace))
                .filter(|node| {
                    let Some(targets) = mandatory_uses.get(node.node_id.as_str()) else {
                        return false;
                    };
                    targets.iter().any(|target| {
                        let Some(dependency) = nodes.get(*target) else {
                            return false;
                        };
                        if dependency.is_in(marketplace) {
                            return false;
                        }
                        // A substitutable alternative shares (kind, id) and is
                        // still tagged with the marketplace
                        let has_alternative = nodes.values().any(|candidate| {
                            candidate.node_id != dependency.node_id
                                && candidate.content_type == dependency.content_type
                                && candidate.id == dependency.id
                                && candidate.is_in(marketplace)
                        });
                        !has_alternative
                    })
                })
                .map(|node| node.node_id.clone())
                .collect()
        };

        if to_remove.is_empty() {
            return Ok(0);
        }

        let mut nodes = self.nodes.write();
        let mut changed = 0;
        for node_id in to_remove {
            if let Some(node) = nodes.get_mut(&node_id) {
                if node.marketplaces.remove(marketplace) {
                    debug!(node = %node_id, marketplace = %marketplace, "dropped from marketplace");
                    changed += 1;
                }
            }
        }
        info!(marketplace = %marketplace, changed, "marketplace pass complete");
        Ok(changed)
    }

    async fn run_dependency_aggregation(&self, config: &DependencyConfig) -> Result<usize> {
        struct PlannedEdge {
            source: NodeId,
            target: NodeId,
            mandatorily: bool,
            marketplaces: MarketplaceSet,
        }

        let plan: Vec<PlannedEdge> = {
            let nodes = self.nodes.read();
            let edges = self.relationships.read();

            let mut in_pack: AHashMap<&str, &str> = AHashMap::new();
            for edge in edges.values() {
                if edge.kind == RelationshipKind::InPack {
                    in_pack.insert(edge.source_node_id.as_str(), edge.target_node_id.as_str());
                }
            }

            let mut pairs: AHashMap<(NodeId, NodeId), (bool, MarketplaceSet)> = AHashMap::new();
            for edge in edges.values() {
                if edge.kind != RelationshipKind::Uses {
                    continue;
                }
                let (Some(pack_a_id), Some(pack_b_id)) = (
                    in_pack.get(edge.source_node_id.as_str()),
                    in_pack.get(edge.target_node_id.as_str()),
                ) else {
                    continue;
                };
                if pack_a_id == pack_b_id {
                    continue;
                }
                let (Some(pack_a), Some(pack_b)) =
                    (nodes.get(*pack_a_id), nodes.get(*pack_b_id))
                else {
                    continue;
                };
                if config.is_ignored(&pack_a.id) || config.is_ignored(&pack_b.id) {
                    continue;
                }
                let common = pack_a.marketplaces.intersection(&pack_b.marketplaces);
                if common.is_empty() {
                    continue;
                }
                let entry = pairs
                    .entry((pack_a.node_id.clone(), pack_b.node_id.clone()))
                    .or_insert_with(|| (false, common));
                entry.0 = entry.0 || edge.mandatorily;
            }

            pairs
                .into_iter()
                .map(|((source, target), (mandatorily, marketplaces))| PlannedEdge {
                    source,
                    target,
                    mandatorily,
                    marketplaces,
                })
                .collect()
        };

        let mut edges = self.relationships.write();
        let mut created = 0;
        for planned in plan {
            if merge_edge(
                &mut edges,
                RelationshipKind::DependsOn,
                planned.source,
                planned.target,
                planned.mandatorily,
                false,
                Some(&planned.marketplaces),
            ) {
                created += 1;
            }
        }
        info!(created, "dependency aggregation complete");
        Ok(created)
    }

    async fn get_node(&self, node_id: &str) -> Result<Option<ContentNode>> {
        Ok(self.nodes.read().get(node_id).cloned())
    }

    async fn nodes_by_type(&self, content_type: ContentType) -> Result<Vec<ContentNode>> {
        let mut result: Vec<ContentNode> = self
            .nodes
            .read()
            .values()
            .filter(|n| n.content_type == content_type)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(result)
    }

    async fn relationships_of_kind(
        &self,
        kind: RelationshipKind,
    ) -> Result<Vec<StoredRelationship>> {
        let mut result: Vec<StoredRelationship> = self
            .relationships
            .read()
            .values()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect();
        result.sort_by(|a, b| {
            (a.source_node_id.as_str(), a.target_node_id.as_str())
                .cmp(&(b.source_node_id.as_str(), b.target_node_id.as_str()))
        });
        Ok(result)
    }

    async fn stats(&self) -> Result<GraphStats> {
        let nodes = self.nodes.read();
        let edges = self.relationships.read();

        let mut stats = GraphStats {
            total_nodes: nodes.len(),
            total_relationships: edges.len(),
            ..GraphStats::default()
        };
        for node in nodes.values() {
            *stats.nodes_by_type.entry(node.content_type).or_insert(0) += 1;
        }
        for edge in edges.values() {
            *stats.relationships_by_kind.entry(edge.kind).or_insert(0) += 1;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::Marketplace;

    fn live(content_type: ContentType, id: &str, mps: &[Marketplace]) -> ContentNode {
        ContentNode::new(content_type, id, id)
            .with_marketplaces(mps.iter().copied().collect())
    }

    fn mps(list: &[Marketplace]) -> MarketplaceSet {
        list.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_upsert_nodes_is_idempotent() {
        let store = InMemoryGraphStore::new();
        let node = live(ContentType::Script, "s1", &[Marketplace::Xsoar]);

        store
            .upsert_nodes(ContentType::Script, vec![node.clone()])
            .await
            .unwrap();
        store
            .upsert_nodes(ContentType::Script, vec![node])
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_nodes, 1);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_new_attr_keys_keeps_old() {
        let store = InMemoryGraphStore::new();
        let first = live(ContentType::Script, "s1", &[Marketplace::Xsoar])
            .with_attr("tags", serde_json::json!(["a"]))
            .with_attr("description", serde_json::json!("old"));
        store
            .upsert_nodes(ContentType::Script, vec![first])
            .await
            .unwrap();

        let second = live(ContentType::Script, "s1", &[Marketplace::Xsoar])
            .with_attr("description", serde_json::json!("new"));
        store
            .upsert_nodes(ContentType::Script, vec![second])
            .await
            .unwrap();

        let node = store.get_node("Script:s1").await.unwrap().unwrap();
        assert_eq!(node.attrs.get("description"), Some(&serde_json::json!("new")));
        assert_eq!(node.attrs.get("tags"), Some(&serde_json::json!(["a"])));
    }

    #[tokio::test]
    async fn test_schema_violation_rejects_whole_batch() {
        let store = InMemoryGraphStore::new();
        let good = live(ContentType::Script, "ok", &[Marketplace::Xsoar]);
        let bad = ContentNode::new(ContentType::Script, "bad", "bad"); // no marketplaces

        let err = store
            .upsert_nodes(ContentType::Script, vec![good, bad])
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::shared::models::ErrorKind::Schema);

        // Nothing applied, not even the valid record
        assert_eq!(store.stats().await.unwrap().total_nodes, 0);
    }

    #[tokio::test]
    async fn test_has_command_seeds_then_unions_marketplaces() {
        let store = InMemoryGraphStore::new();
        store
            .upsert_nodes(
                ContentType::Integration,
                vec![
                    live(ContentType::Integration, "i1", &[Marketplace::Xsoar]),
                    live(ContentType::Integration, "i2", &[Marketplace::MarketplaceV2]),
                ],
            )
            .await
            .unwrap();

        let rel = |source: &str, source_mps: &[Marketplace]| {
            Relationship::new(
                RelationshipKind::HasCommand,
                format!("Integration:{source}"),
                mps(source_mps),
                "cmd1",
            )
        };
        store
            .upsert_relationships(
                RelationshipKind::HasCommand,
                vec![rel("i1", &[Marketplace::Xsoar])],
            )
            .await
            .unwrap();

        let cmd = store.get_node("Command:cmd1").await.unwrap().unwrap();
        assert_eq!(cmd.marketplaces, mps(&[Marketplace::Xsoar]));

        store
            .upsert_relationships(
                RelationshipKind::HasCommand,
                vec![rel("i2", &[Marketplace::MarketplaceV2])],
            )
            .await
            .unwrap();

        let cmd = store.get_node("Command:cmd1").await.unwrap().unwrap();
        assert_eq!(
            cmd.marketplaces,
            mps(&[Marketplace::Xsoar, Marketplace::MarketplaceV2])
        );
    }

    #[tokio::test]
    async fn test_uses_requires_shared_marketplace() {
        let store = InMemoryGraphStore::new();
        store
            .upsert_nodes(
                ContentType::Playbook,
                vec![live(ContentType::Playbook, "pb", &[Marketplace::Xsoar])],
            )
            .await
            .unwrap();
        store
            .upsert_nodes(
                ContentType::Script,
                vec![live(ContentType::Script, "s", &[Marketplace::Xpanse])],
            )
            .await
            .unwrap();

        // Disjoint marketplaces: edge skipped
        let touched = store
            .upsert_relationships(
                RelationshipKind::Uses,
                vec![Relationship::new(
                    RelationshipKind::Uses,
                    "Playbook:pb",
                    mps(&[Marketplace::Xsoar]),
                    "Script:s",
                )],
            )
            .await
            .unwrap();
        assert_eq!(touched, 0);
        assert!(store
            .relationships_of_kind(RelationshipKind::Uses)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_uses_mandatory_or_fold_on_remerge() {
        let store = InMemoryGraphStore::new();
        store
            .upsert_nodes(
                ContentType::Script,
                vec![
                    live(ContentType::Script, "a", &[Marketplace::Xsoar]),
                    live(ContentType::Script, "b", &[Marketplace::Xsoar]),
                ],
            )
            .await
            .unwrap();

        let edge = |mandatorily: bool| {
            Relationship::new(
                RelationshipKind::Uses,
                "Script:a",
                mps(&[Marketplace::Xsoar]),
                "Script:b",
            )
            .mandatorily(mandatorily)
        };

        store
            .upsert_relationships(RelationshipKind::Uses, vec![edge(false)])
            .await
            .unwrap();
        store
            .upsert_relationships(RelationshipKind::Uses, vec![edge(true)])
            .await
            .unwrap();
        store
            .upsert_relationships(RelationshipKind::Uses, vec![edge(false)])
            .await
            .unwrap();

        let edges = store
            .relationships_of_kind(RelationshipKind::Uses)
            .await
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert!(edges[0].mandatorily);
    }

    #[tokio::test]
    async fn test_uses_command_or_script_resolves_to_all_matches() {
        let store = InMemoryGraphStore::new();
        store
            .upsert_nodes(
                ContentType::Script,
                vec![
                    live(ContentType::Script, "caller", &[Marketplace::Xsoar]),
                    live(ContentType::Script, "helper", &[Marketplace::Xsoar]),
                ],
            )
            .await
            .unwrap();
        store
            .upsert_nodes(
                ContentType::Integration,
                vec![live(ContentType::Integration, "i", &[Marketplace::Xsoar])],
            )
            .await
            .unwrap();
        store
            .upsert_relationships(
                RelationshipKind::HasCommand,
                vec![Relationship::new(
                    RelationshipKind::HasCommand,
                    "Integration:i",
                    mps(&[Marketplace::Xsoar]),
                    "helper",
                )],
            )
            .await
            .unwrap();

        // "helper" now names both a Script and a Command
        store
            .upsert_relationships(
                RelationshipKind::UsesCommandOrScript,
                vec![Relationship::new(
                    RelationshipKind::UsesCommandOrScript,
                    "Script:caller",
                    mps(&[Marketplace::Xsoar]),
                    "helper",
                )
                .mandatorily(true)],
            )
            .await
            .unwrap();

        let edges = store
            .relationships_of_kind(RelationshipKind::Uses)
            .await
            .unwrap();
        let targets: Vec<&str> = edges.iter().map(|e| e.target_node_id.as_str()).collect();
        assert_eq!(targets, vec!["Command:helper", "Script:helper"]);
    }

    #[tokio::test]
    async fn test_marketplace_pass_scenario_a() {
        // Integration I in {X, Y} mandatorily uses Script S in {Y} only:
        // after one pass over X, I is in {Y} alone.
        let store = InMemoryGraphStore::new();
        store
            .upsert_nodes(
                ContentType::Integration,
                vec![live(
                    ContentType::Integration,
                    "I",
                    &[Marketplace::Xsoar, Marketplace::MarketplaceV2],
                )],
            )
            .await
            .unwrap();
        store
            .upsert_nodes(
                ContentType::Script,
                vec![live(ContentType::Script, "S", &[Marketplace::MarketplaceV2])],
            )
            .await
            .unwrap();
        store
            .upsert_relationships(
                RelationshipKind::Uses,
                vec![Relationship::new(
                    RelationshipKind::Uses,
                    "Integration:I",
                    mps(&[Marketplace::Xsoar, Marketplace::MarketplaceV2]),
                    "Script:S",
                )
                .mandatorily(true)],
            )
            .await
            .unwrap();

        let changed = store
            .run_marketplace_pass(Marketplace::Xsoar)
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let node = store.get_node("Integration:I").await.unwrap().unwrap();
        assert_eq!(node.marketplaces, mps(&[Marketplace::MarketplaceV2]));

        // Monotonic: nothing left to remove, pass is idempotent at fixpoint
        assert_eq!(
            store
                .run_marketplace_pass(Marketplace::Xsoar)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_marketplace_pass_respects_alternatives() {
        // The dependency is missing from X, but an alternative node with the
        // same (kind, id) is present there, so nothing is pruned.
        let store = InMemoryGraphStore::new();
        store
            .upsert_nodes(
                ContentType::Integration,
                vec![live(ContentType::Integration, "I", &[Marketplace::Xsoar])],
            )
            .await
            .unwrap();
        let dep = live(ContentType::Script, "S", &[Marketplace::MarketplaceV2]);
        // Same (kind, id) under a divergent node_id, tagged with X
        let mut alternative = live(ContentType::Script, "S", &[Marketplace::Xsoar]);
        alternative.node_id = "Script:S_alt".to_string();
        alternative.id = "S".to_string();
        {
            let mut nodes = store.nodes.write();
            nodes.insert(dep.node_id.clone(), dep);
            nodes.insert(alternative.node_id.clone(), alternative);
        }
        {
            let mut edges = store.relationships.write();
            merge_edge(
                &mut edges,
                RelationshipKind::Uses,
                "Integration:I".into(),
                "Script:S".into(),
                true,
                false,
                None,
            );
        }

        assert_eq!(
            store
                .run_marketplace_pass(Marketplace::Xsoar)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_dependency_aggregation_scenario_c() {
        let store = InMemoryGraphStore::new();
        let x = Marketplace::Xsoar;
        let y = Marketplace::MarketplaceV2;

        store
            .upsert_nodes(
                ContentType::Pack,
                vec![
                    live(ContentType::Pack, "A", &[x, y]),
                    live(ContentType::Pack, "B", &[x]),
                    live(ContentType::Pack, "C", &[x, y]),
                ],
            )
            .await
            .unwrap();
        store
            .upsert_nodes(
                ContentType::Script,
                vec![
                    live(ContentType::Script, "a1", &[x, y]),
                    live(ContentType::Script, "b1", &[x]),
                    live(ContentType::Script, "c1", &[x, y]),
                ],
            )
            .await
            .unwrap();

        let in_pack = |item: &str, pack: &str| {
            Relationship::new(
                RelationshipKind::InPack,
                format!("Script:{item}"),
                mps(&[x]),
                format!("Pack:{pack}"),
            )
        };
        store
            .upsert_relationships(
                RelationshipKind::InPack,
                vec![in_pack("a1", "A"), in_pack("b1", "B"), in_pack("c1", "C")],
            )
            .await
            .unwrap();

        store
            .upsert_relationships(
                RelationshipKind::Uses,
                vec![
                    Relationship::new(
                        RelationshipKind::Uses,
                        "Script:a1",
                        mps(&[x, y]),
                        "Script:b1",
                    )
                    .mandatorily(true),
                    Relationship::new(
                        RelationshipKind::Uses,
                        "Script:a1",
                        mps(&[x, y]),
                        "Script:c1",
                    ),
                ],
            )
            .await
            .unwrap();

        let created = store
            .run_dependency_aggregation(&DependencyConfig::default())
            .await
            .unwrap();
        assert_eq!(created, 2);

        let deps = store
            .relationships_of_kind(RelationshipKind::DependsOn)
            .await
            .unwrap();
        assert_eq!(deps.len(), 2);

        let ab = deps
            .iter()
            .find(|e| e.target_node_id == "Pack:B")
            .unwrap();
        assert!(ab.mandatorily);
        assert_eq!(ab.marketplaces, mps(&[x]));

        let ac = deps
            .iter()
            .find(|e| e.target_node_id == "Pack:C")
            .unwrap();
        assert!(!ac.mandatorily);
        assert_eq!(ac.marketplaces, mps(&[x, y]));

        // Re-running creates nothing new and never downgrades mandatorily
        let created = store
            .run_dependency_aggregation(&DependencyConfig::default())
            .await
            .unwrap();
        assert_eq!(created, 0);
        let deps = store
            .relationships_of_kind(RelationshipKind::DependsOn)
            .await
            .unwrap();
        assert!(deps.iter().find(|e| e.target_node_id == "Pack:B").unwrap().mandatorily);
    }

    #[tokio::test]
    async fn test_dependency_aggregation_exclusions() {
        let store = InMemoryGraphStore::new();
        let x = Marketplace::Xsoar;
        store
            .upsert_nodes(
                ContentType::Pack,
                vec![
                    live(ContentType::Pack, "A", &[x]),
                    live(ContentType::Pack, "Base", &[x]),
                ],
            )
            .await
            .unwrap();
        store
            .upsert_nodes(
                ContentType::Script,
                vec![
                    live(ContentType::Script, "a1", &[x]),
                    live(ContentType::Script, "a2", &[x]),
                    live(ContentType::Script, "base1", &[x]),
                ],
            )
            .await
            .unwrap();
        store
            .upsert_relationships(
                RelationshipKind::InPack,
                vec![
                    Relationship::new(RelationshipKind::InPack, "Script:a1", mps(&[x]), "Pack:A"),
                    Relationship::new(RelationshipKind::InPack, "Script:a2", mps(&[x]), "Pack:A"),
                    Relationship::new(
                        RelationshipKind::InPack,
                        "Script:base1",
                        mps(&[x]),
                        "Pack:Base",
                    ),
                ],
            )
            .await
            .unwrap();
        store
            .upsert_relationships(
                RelationshipKind::Uses,
                vec![
                    // Intra-pack: no DEPENDS_ON
                    Relationship::new(RelationshipKind::Uses, "Script:a1", mps(&[x]), "Script:a2")
                        .mandatorily(true),
                    // To an ignored pack: no DEPENDS_ON
                    Relationship::new(
                        RelationshipKind::Uses,
                        "Script:a1",
                        mps(&[x]),
                        "Script:base1",
                    )
                    .mandatorily(true),
                ],
            )
            .await
            .unwrap();

        let created = store
            .run_dependency_aggregation(&DependencyConfig::default())
            .await
            .unwrap();
        assert_eq!(created, 0);
        assert!(store
            .relationships_of_kind(RelationshipKind::DependsOn)
            .await
            .unwrap()
            .is_empty());
    }
}
