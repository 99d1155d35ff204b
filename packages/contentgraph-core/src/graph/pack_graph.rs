//! Pack dependency graph.
//!
//! Directed graph over packs, assembled from committed `DEPENDS_ON` edges.
//! Supports direct and transitive dependency queries and cycle detection via
//! Tarjan SCC.

use std::collections::VecDeque;

use ahash::{AHashMap, AHashSet};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::shared::models::{split_node_id, MarketplaceSet, RelationshipKind, StoredRelationship};

/// Edge payload: the folded `DEPENDS_ON` properties.
#[derive(Debug, Clone)]
pub struct PackDependency {
    pub mandatorily: bool,
    pub marketplaces: MarketplaceSet,
}

/// Directed graph where nodes are pack ids and an edge A -> B means pack A
/// depends on pack B.
pub struct PackDependencyGraph {
    graph: DiGraph<String, PackDependency>,
    index: AHashMap<String, NodeIndex>,
}

impl PackDependencyGraph {
    /// Build from committed edges; kinds other than `DEPENDS_ON` are ignored.
    pub fn from_relationships(relationships: &[StoredRelationship]) -> Self {
        fn ensure(
            graph: &mut DiGraph<String, PackDependency>,
            index: &mut AHashMap<String, NodeIndex>,
            node_id: &str,
        ) -> NodeIndex {
            let pack_id = split_node_id(node_id)
                .map(|(_, id)| id)
                .unwrap_or(node_id)
                .to_string();
            *index
                .entry(pack_id.clone())
                .or_insert_with(|| graph.add_node(pack_id))
        }

        let mut graph = DiGraph::new();
        let mut index: AHashMap<String, NodeIndex> = AHashMap::new();

        for rel in relationships {
            if rel.kind != RelationshipKind::DependsOn {
                continue;
            }
            let from = ensure(&mut graph, &mut index, &rel.source_node_id);
            let to = ensure(&mut graph, &mut index, &rel.target_node_id);
            graph.add_edge(
                from,
                to,
                PackDependency {
                    mandatorily: rel.mandatorily,
                    marketplaces: rel.marketplaces.clone(),
                },
            );
        }

        Self { graph, index }
    }

    pub fn pack_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Packs this pack directly depends on, sorted.
    pub fn dependencies_of(&self, pack_id: &str) -> Vec<&str> {
        self.neighbors(pack_id, Direction::Outgoing)
    }

    /// Packs that directly depend on this pack, sorted.
    pub fn dependents_of(&self, pack_id: &str) -> Vec<&str> {
        self.neighbors(pack_id, Direction::Incoming)
    }

    fn neighbors(&self, pack_id: &str, direction: Direction) -> Vec<&str> {
        let Some(&idx) = self.index.get(pack_id) else {
            return Vec::new();
        };
        let mut result: Vec<&str> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].as_str())
            .collect();
        result.sort_unstable();
        result.dedup();
        result
    }

    /// The folded edge properties for a direct dependency, if present.
    pub fn dependency(&self, from: &str, to: &str) -> Option<&PackDependency> {
        let from = *self.index.get(from)?;
        let to = *self.index.get(to)?;
        self.graph
            .find_edge(from, to)
            .map(|edge| &self.graph[edge])
    }

    /// Every pack reachable through dependency edges, excluding the pack
    /// itself. BFS order collapsed to a sorted list.
    pub fn transitive_dependencies(&self, pack_id: &str) -> Vec<String> {
        let Some(&start) = self.index.get(pack_id) else {
            return Vec::new();
        };
        let mut visited: AHashSet<NodeIndex> = AHashSet::from_iter([start]);
        let mut queue: VecDeque<NodeIndex> = VecDeque::from([start]);
        let mut result = Vec::new();

        while let Some(current) = queue.pop_front() {
            for next in self.graph.neighbors_directed(current, Direction::Outgoing) {
                if visited.insert(next) {
                    result.push(self.graph[next].clone());
                    queue.push_back(next);
                }
            }
        }
        result.sort_unstable();
        result
    }

    /// Dependency cycles (strongly connected components of size > 1), each
    /// sorted for stable reporting.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut members: Vec<String> =
                    scc.into_iter().map(|idx| self.graph[idx].clone()).collect();
                members.sort_unstable();
                members
            })
            .collect()
    }
}
