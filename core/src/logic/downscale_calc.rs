//! Machine-Group Down-Scaler pure decision logic (§4.E).

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::NodeView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgeGate {
    /// Old enough: safe to scale down now.
    Ready,
    /// Too young; come back after this much more time.
    RequeueAfter(Duration),
}

/// §4.E Policy-GC: active nodes are those bound to `gc_key` whose size
/// still matches the GC's current desired size (a size-class change makes
/// the old pair inactive even though it's still labeled for the GC).
pub fn active_nodes_for_gc<'a>(gc_key: &str, desired_size: &str, nodes: &'a [NodeView]) -> Vec<&'a NodeView> {
    nodes
        .iter()
        .filter(|n| n.hosted_cluster.as_deref() == Some(gc_key))
        .filter(|n| n.matches_size(desired_size))
        .collect()
}

/// Nodes of `pair_group` that are not in the active set -- candidates to
/// scale down once they clear `nodeScaleDownDelay`.
pub fn inactive_nodes_in_pair_group<'a>(
    pair_group: &str,
    active: &[&NodeView],
    nodes: &'a [NodeView],
) -> Vec<&'a NodeView> {
    nodes
        .iter()
        .filter(|n| n.pair_group.as_deref() == Some(pair_group))
        .filter(|n| !active.iter().any(|a| a.name == n.name))
        .collect()
}

/// §4.E Policy-OrphanNode: the GC is gone, scale down everything sharing
/// the departing node's pair group (or just the node, if it has none).
pub fn orphan_node_targets<'a>(departing: &NodeView, nodes: &'a [NodeView]) -> Vec<&'a NodeView> {
    match &departing.pair_group {
        Some(pg) => nodes.iter().filter(|n| n.pair_group.as_deref() == Some(pg.as_str())).collect(),
        None => nodes.iter().filter(|n| n.name == departing.name).collect(),
    }
}

pub fn age_gate(node: &NodeView, now: DateTime<Utc>, delay: Duration) -> AgeGate {
    let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
    let age = now.signed_duration_since(node.creation_timestamp);
    if age >= delay {
        AgeGate::Ready
    } else {
        let remaining = (delay - age).to_std().unwrap_or(Duration::ZERO);
        AgeGate::RequeueAfter(remaining)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScaleDownPlan {
    /// Node names old enough to scale down now, sorted for determinism.
    pub ready: Vec<String>,
    /// If any candidate is still too young, the minimum remaining delay
    /// across them -- the reconciler requeues at (at least) this long.
    pub requeue_after: Option<Duration>,
}

/// §8 boundary: "New node under nodeScaleDownDelay is not scaled down;
/// requeue >= remaining delay."
pub fn plan_scale_down(candidates: &[&NodeView], now: DateTime<Utc>, delay: Duration) -> ScaleDownPlan {
    let mut ready = Vec::new();
    let mut requeue_after: Option<Duration> = None;

    for node in candidates {
        match age_gate(node, now, delay) {
            AgeGate::Ready => ready.push(node.name.clone()),
            AgeGate::RequeueAfter(remaining) => {
                requeue_after = Some(requeue_after.map_or(remaining, |m| m.min(remaining)));
            }
        }
    }
    ready.sort();
    ScaleDownPlan { ready, requeue_after }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_at(name: &str, pair_group: &str, size: &str, bound_to: Option<&str>, age_secs: i64) -> NodeView {
        NodeView {
            name: name.into(),
            zone: "a".into(),
            size: Some(size.into()),
            pair_group: Some(pair_group.into()),
            hosted_cluster: bound_to.map(str::to_string),
            go_memory_limit: None,
            load_balancer_subnets: None,
            request_serving_component: true,
            creation_timestamp: Utc::now() - chrono::Duration::seconds(age_secs),
            instance_type: None,
            region: None,
        }
    }

    #[test]
    fn size_change_makes_old_pair_inactive() {
        let nodes =
            vec![node_at("n1", "p1", "small", Some("ns-gc1"), 1000), node_at("n2", "p1", "small", Some("ns-gc1"), 1000)];
        let active = active_nodes_for_gc("ns-gc1", "medium", &nodes);
        assert!(active.is_empty());
        let inactive = inactive_nodes_in_pair_group("p1", &active, &nodes);
        assert_eq!(inactive.len(), 2);
    }

    #[test]
    fn young_node_requeues_instead_of_scaling_down() {
        let nodes = vec![node_at("n1", "p1", "small", Some("ns-gc1"), 10)];
        let candidates: Vec<&NodeView> = nodes.iter().collect();
        let plan = plan_scale_down(&candidates, Utc::now(), Duration::from_secs(300));
        assert!(plan.ready.is_empty());
        assert!(plan.requeue_after.unwrap() <= Duration::from_secs(290));
        assert!(plan.requeue_after.unwrap() > Duration::from_secs(0));
    }

    #[test]
    fn old_node_is_ready_now() {
        let nodes = vec![node_at("n1", "p1", "small", Some("ns-gc1"), 1000)];
        let candidates: Vec<&NodeView> = nodes.iter().collect();
        let plan = plan_scale_down(&candidates, Utc::now(), Duration::from_secs(300));
        assert_eq!(plan.ready, vec!["n1".to_string()]);
        assert!(plan.requeue_after.is_none());
    }

    #[test]
    fn orphan_node_targets_whole_pair_group() {
        let nodes = vec![node_at("n1", "p1", "small", None, 1000), node_at("n2", "p1", "small", None, 1000)];
        let targets = orphan_node_targets(&nodes[0], &nodes);
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn orphan_node_without_pair_group_targets_only_itself() {
        let mut lone = node_at("n1", "p1", "small", None, 1000);
        lone.pair_group = None;
        let other = node_at("n2", "p2", "small", None, 1000);
        let nodes = vec![lone.clone(), other];
        let targets = orphan_node_targets(&lone, &nodes);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name, "n1");
    }
}
