//! Property tests for the merge-fold laws and propagation monotonicity.

use contentgraph_core::{
    ContentGraphStore, ContentNode, ContentType, InMemoryGraphStore, Marketplace, MarketplaceSet,
    Relationship, RelationshipKind, StoredRelationship,
};
use proptest::prelude::*;

fn marketplace_strategy() -> impl Strategy<Value = Marketplace> {
    prop_oneof![
        Just(Marketplace::Xsoar),
        Just(Marketplace::MarketplaceV2),
        Just(Marketplace::Xpanse),
    ]
}

fn set_strategy() -> impl Strategy<Value = MarketplaceSet> {
    proptest::collection::vec(marketplace_strategy(), 0..4)
        .prop_map(|v| v.into_iter().collect())
}

fn nonempty_set_strategy() -> impl Strategy<Value = MarketplaceSet> {
    proptest::collection::vec(marketplace_strategy(), 1..4)
        .prop_map(|v| v.into_iter().collect())
}

proptest! {
    #[test]
    fn union_is_idempotent_and_commutative(a in set_strategy(), b in set_strategy()) {
        let mut ab = a.clone();
        ab.union_with(&b);
        let mut ba = b.clone();
        ba.union_with(&a);
        prop_assert_eq!(&ab, &ba);

        let mut again = ab.clone();
        again.union_with(&b);
        prop_assert_eq!(again, ab);
    }

    #[test]
    fn intersection_is_a_subset_of_both(a in set_strategy(), b in set_strategy()) {
        let common = a.intersection(&b);
        prop_assert!(common.is_subset(&a));
        prop_assert!(common.is_subset(&b));
        prop_assert_eq!(common.is_empty(), !a.intersects(&b));
    }

    #[test]
    fn mandatory_fold_is_an_or_over_any_sequence(flags in proptest::collection::vec(any::<bool>(), 1..8)) {
        let mut edge = StoredRelationship::new(RelationshipKind::Uses, "Script:a", "Script:b");
        for &flag in &flags {
            edge.fold(flag, false, None);
        }
        prop_assert_eq!(edge.mandatorily, flags.iter().any(|&f| f));
    }

    #[test]
    fn propagation_only_shrinks_marketplaces(
        node_sets in proptest::collection::vec(nonempty_set_strategy(), 2..8),
        edges in proptest::collection::vec((0usize..8, 0usize..8, any::<bool>()), 0..16),
        marketplace in marketplace_strategy(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");
        runtime.block_on(async {
            let store = InMemoryGraphStore::new();
            let nodes: Vec<ContentNode> = node_sets
                .iter()
                .enumerate()
                .map(|(i, set)| {
                    ContentNode::new(ContentType::Script, format!("s{i}"), format!("s{i}"))
                        .with_marketplaces(set.clone())
                })
                .collect();
            let before: Vec<MarketplaceSet> =
                nodes.iter().map(|n| n.marketplaces.clone()).collect();
            store
                .upsert_nodes(ContentType::Script, nodes)
                .await
                .expect("upsert");

            let count = node_sets.len();
            let batch: Vec<Relationship> = edges
                .iter()
                .filter(|(from, to, _)| from % count != to % count)
                .map(|(from, to, mandatorily)| {
                    Relationship::new(
                        RelationshipKind::Uses,
                        format!("Script:s{}", from % count),
                        MarketplaceSet::all(),
                        format!("Script:s{}", to % count),
                    )
                    .mandatorily(*mandatorily)
                })
                .collect();
            store
                .upsert_relationships(RelationshipKind::Uses, batch)
                .await
                .expect("edges");

            // Drive to fixpoint; shrinkage bounds the pass count
            let mut passes = 0;
            loop {
                let changed = store.run_marketplace_pass(marketplace).await.expect("pass");
                passes += 1;
                if changed == 0 {
                    break;
                }
                assert!(passes <= count + 1, "did not converge");
            }

            // Monotonic shrinkage, and idempotence at the fixpoint
            for (i, original) in before.iter().enumerate() {
                let node = store
                    .get_node(&format!("Script:s{i}"))
                    .await
                    .expect("get")
                    .expect("node");
                assert!(node.marketplaces.is_subset(original));
            }
            assert_eq!(store.run_marketplace_pass(marketplace).await.expect("pass"), 0);
        });
    }
}
