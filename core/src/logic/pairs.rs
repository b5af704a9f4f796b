//! Pair probing/completion logic for Scheduler-Sizer (§4.C steps 1-4).
//!
//! Kept free of any store access so the partial-bind resumption behavior
//! ("safely resumed on next reconcile because step 3 finds the partial
//! pair") is exercised with plain `Vec<NodeView>` fixtures.

use super::NodeView;

/// Outcome of probing the current Node snapshot for a GC's pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairState {
    /// Two nodes bound, distinct zones, matching `desired_size`: done.
    Complete { pair_group: String },
    /// Two nodes bound but not usable as-is (wrong size, or same zone --
    /// can happen transiently after a size change, §8 S5). Scheduler-Sizer
    /// treats this the same as `NeedsPlaceholder` (start the step-7 path)
    /// since no in-place repair is defined.
    Mismatched,
    /// One node bound; the other half of the pair must come from `free`
    /// with the same `pair_group`, matching size, and a different zone.
    Partial { bound: NodeView, pair_group: String },
    /// No bound node at all: try adopting a ready placeholder (step 4),
    /// else fall through to the step-7 holding-deployment path.
    None,
}

/// §4.C step 1-2: partition Nodes and probe the existing pair.
pub fn probe_pair(gc_key: &str, nodes: &[NodeView], desired_size: &str) -> PairState {
    let mut bound: Vec<&NodeView> = nodes
        .iter()
        .filter(|n| n.hosted_cluster.as_deref() == Some(gc_key))
        .collect();
    bound.sort_by(|a, b| a.name.cmp(&b.name));

    match bound.as_slice() {
        [] => PairState::None,
        [single] => match &single.pair_group {
            Some(pg) => PairState::Partial { bound: (*single).clone(), pair_group: pg.clone() },
            None => PairState::None,
        },
        [a, b, ..] => {
            let same_pair_group = a.pair_group.is_some() && a.pair_group == b.pair_group;
            let matches_size = a.matches_size(desired_size) && b.matches_size(desired_size);
            let distinct_zones = a.zone != b.zone;
            if same_pair_group && matches_size && distinct_zones {
                PairState::Complete { pair_group: a.pair_group.clone().unwrap() }
            } else {
                PairState::Mismatched
            }
        }
    }
}

/// §4.C step 3: pick the node that completes a partial pair, deterministically.
pub fn completion_candidate<'a>(
    free: &'a [NodeView],
    pair_group: &str,
    desired_size: &str,
    existing_zone: &str,
) -> Option<&'a NodeView> {
    let mut candidates: Vec<&NodeView> = free
        .iter()
        .filter(|n| n.is_free())
        .filter(|n| n.pair_group.as_deref() == Some(pair_group))
        .filter(|n| n.matches_size(desired_size))
        .filter(|n| n.zone != existing_zone)
        .collect();
    candidates.sort_by(|a, b| a.name.cmp(&b.name));
    candidates.into_iter().next()
}

/// §4.C step 4: a ready PD's pods occupy nodes with a shared pair group not
/// currently in `taken`. Returns that pair's two nodes if such a PD exists
/// among `ready_placeholder_pair_groups` (pair groups backing a *ready*
/// generic placeholder deployment for `desired_size`).
pub fn adopt_from_placeholder<'a>(
    free: &'a [NodeView],
    desired_size: &str,
    ready_placeholder_pair_groups: &[String],
    taken: &[String],
) -> Option<Vec<&'a NodeView>> {
    let mut sorted_groups = ready_placeholder_pair_groups.to_vec();
    sorted_groups.sort();

    for pg in &sorted_groups {
        if taken.contains(pg) {
            continue;
        }
        let mut nodes: Vec<&NodeView> = free
            .iter()
            .filter(|n| n.is_free())
            .filter(|n| n.pair_group.as_deref() == Some(pg.as_str()))
            .filter(|n| n.matches_size(desired_size))
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        if nodes.len() == 2 && nodes[0].zone != nodes[1].zone {
            return Some(nodes);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn node(name: &str, zone: &str, size: &str, pair_group: &str, bound_to: Option<&str>) -> NodeView {
        NodeView {
            name: name.into(),
            zone: zone.into(),
            size: Some(size.into()),
            pair_group: Some(pair_group.into()),
            hosted_cluster: bound_to.map(|s| s.to_string()),
            go_memory_limit: None,
            load_balancer_subnets: None,
            request_serving_component: true,
            creation_timestamp: Utc::now(),
            instance_type: None,
            region: None,
        }
    }

    #[test]
    fn complete_pair_detected() {
        let nodes = vec![
            node("n1", "us-east-1a", "small", "p1", Some("ns-gc1")),
            node("n2", "us-east-1b", "small", "p1", Some("ns-gc1")),
        ];
        assert_eq!(probe_pair("ns-gc1", &nodes, "small"), PairState::Complete { pair_group: "p1".into() });
    }

    #[test]
    fn same_zone_is_mismatched() {
        let nodes = vec![
            node("n1", "us-east-1a", "small", "p1", Some("ns-gc1")),
            node("n2", "us-east-1a", "small", "p1", Some("ns-gc1")),
        ];
        assert_eq!(probe_pair("ns-gc1", &nodes, "small"), PairState::Mismatched);
    }

    #[test]
    fn wrong_size_is_mismatched() {
        let nodes = vec![
            node("n1", "us-east-1a", "medium", "p1", Some("ns-gc1")),
            node("n2", "us-east-1b", "medium", "p1", Some("ns-gc1")),
        ];
        assert_eq!(probe_pair("ns-gc1", &nodes, "small"), PairState::Mismatched);
    }

    #[test]
    fn partial_pair_detected_and_resumable() {
        let nodes = vec![node("n1", "us-east-1a", "small", "p1", Some("ns-gc1"))];
        let state = probe_pair("ns-gc1", &nodes, "small");
        assert_eq!(state, PairState::Partial { bound: nodes[0].clone(), pair_group: "p1".into() });
    }

    #[test]
    fn completion_candidate_is_deterministic() {
        let free = vec![
            node("n-zzz", "us-east-1b", "small", "p1", None),
            node("n-aaa", "us-east-1b", "small", "p1", None),
            node("n-same-zone", "us-east-1a", "small", "p1", None),
            node("n-wrong-size", "us-east-1b", "medium", "p1", None),
            node("n-wrong-group", "us-east-1b", "small", "p2", None),
        ];
        let chosen = completion_candidate(&free, "p1", "small", "us-east-1a").unwrap();
        assert_eq!(chosen.name, "n-aaa");
    }

    #[test]
    fn adopt_from_placeholder_skips_taken_groups() {
        let free = vec![
            node("n1", "us-east-1a", "small", "p1", None),
            node("n2", "us-east-1b", "small", "p1", None),
            node("n3", "us-east-1a", "small", "p2", None),
            node("n4", "us-east-1b", "small", "p2", None),
        ];
        let result = adopt_from_placeholder(&free, "small", &["p1".into(), "p2".into()], &["p1".into()]);
        let names: Vec<_> = result.unwrap().iter().map(|n| n.name.clone()).collect();
        assert_eq!(names, vec!["n3", "n4"]);
    }

    #[test]
    fn adopt_from_placeholder_requires_distinct_zones() {
        let free = vec![
            node("n1", "us-east-1a", "small", "p1", None),
            node("n2", "us-east-1a", "small", "p1", None),
        ];
        assert!(adopt_from_placeholder(&free, "small", &["p1".into()], &[]).is_none());
    }
}
