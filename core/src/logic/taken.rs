//! `takenPairGroups` computation, shared by Placeholder Manager (§4.B),
//! Scheduler-Sizer (§4.C) and Up-Scaler (§4.D): a pair group is "taken" if
//! any node in it is bound to a GC, or any pending placeholder pod already
//! references it.
//!
//! Materialized as a sorted `Vec` everywhere (§5 determinism, §4.B
//! ordering note: "when the takenPairGroups list is materialized it is
//! sorted").

use std::collections::BTreeSet;

use super::{NodeView, PendingPodView};

/// Pair groups bound to some GC, from the current Node snapshot.
pub fn taken_from_nodes(nodes: &[NodeView]) -> BTreeSet<String> {
    nodes
        .iter()
        .filter(|n| n.is_bound())
        .filter_map(|n| n.pair_group.clone())
        .collect()
}

/// Pair groups already claimed by a pending pod's node affinity (e.g. a
/// holding deployment completing a partial pair references that pair's
/// group before any node carries the GC's taint yet).
pub fn taken_from_pending_pods(pods: &[PendingPodView]) -> BTreeSet<String> {
    pods.iter().filter_map(|p| p.required_pair_group.clone()).collect()
}

/// Full `takenPairGroups`, recomputed from fresh state every reconcile
/// (§4.C: "takenPairGroups recomputed from fresh state on every reconcile").
pub fn compute_taken_pair_groups(nodes: &[NodeView], pending_pods: &[PendingPodView]) -> Vec<String> {
    let mut taken = taken_from_nodes(nodes);
    taken.extend(taken_from_pending_pods(pending_pods));
    taken.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn node(name: &str, pair_group: &str, bound: bool) -> NodeView {
        NodeView {
            name: name.into(),
            zone: "a".into(),
            size: Some("small".into()),
            pair_group: Some(pair_group.into()),
            hosted_cluster: bound.then(|| "ns-gc1".to_string()),
            go_memory_limit: None,
            load_balancer_subnets: None,
            request_serving_component: true,
            creation_timestamp: Utc::now(),
            instance_type: None,
            region: None,
        }
    }

    #[test]
    fn only_bound_nodes_contribute() {
        let nodes = vec![node("n1", "p1", true), node("n2", "p1", true), node("n3", "p2", false)];
        let taken = compute_taken_pair_groups(&nodes, &[]);
        assert_eq!(taken, vec!["p1".to_string()]);
    }

    #[test]
    fn pending_pods_add_to_taken_and_stay_sorted() {
        let nodes = vec![node("n1", "p3", true)];
        let pods = vec![
            PendingPodView {
                name: "pod-1".into(),
                owner_key: "ns-gc2".into(),
                size: "small".into(),
                required_pair_group: Some("p1".into()),
            },
            PendingPodView {
                name: "pod-2".into(),
                owner_key: "ns-gc2".into(),
                size: "small".into(),
                required_pair_group: Some("p2".into()),
            },
        ];
        let taken = compute_taken_pair_groups(&nodes, &pods);
        assert_eq!(taken, vec!["p1".to_string(), "p2".to_string(), "p3".to_string()]);
    }

    #[test]
    fn duplicate_pair_groups_deduplicated() {
        let nodes = vec![node("n1", "p1", true), node("n2", "p1", true)];
        assert_eq!(compute_taken_pair_groups(&nodes, &[]).len(), 1);
    }
}
