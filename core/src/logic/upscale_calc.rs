//! Machine-Group Up-Scaler pure decision logic (§4.D).

use std::collections::{BTreeMap, BTreeSet};

use super::{MachineGroupView, NodeView, PendingPodView};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub size: String,
    pub pair_group: Option<String>,
    pub count: u32,
}

/// §4.D step 2: group pending pods into pairs by their owning PD/holding
/// deployment. A "found pair" (>=2 pods from the same owner) always
/// becomes a requirement; a lone pending pod only becomes a requirement if
/// it carries an explicit pair-group requirement, otherwise it is ignored
/// ("generic placeholders awaiting rollout").
pub fn compute_requirements(pods: &[PendingPodView]) -> Vec<Requirement> {
    let mut groups: BTreeMap<&str, Vec<&PendingPodView>> = BTreeMap::new();
    for p in pods {
        groups.entry(p.owner_key.as_str()).or_default().push(p);
    }

    let mut requirements = Vec::new();
    for (_, members) in groups {
        let count = members.len() as u32;
        let pair_group = members.iter().find_map(|p| p.required_pair_group.clone());
        if count >= 2 {
            requirements.push(Requirement { size: members[0].size.clone(), pair_group, count: count.min(2) });
        } else if let Some(pg) = pair_group {
            requirements.push(Requirement { size: members[0].size.clone(), pair_group: Some(pg), count });
        }
    }
    requirements
}

/// §4.D step 3: targeted pair scale-up. Returns the MachineGroup names to
/// scale to 1 replica.
pub fn targeted_scale_up(requirement: &Requirement, mgs: &[MachineGroupView]) -> Vec<String> {
    let Some(pair_group) = &requirement.pair_group else { return Vec::new() };
    let mut names: Vec<String> = mgs
        .iter()
        .filter(|mg| mg.size == requirement.size && &mg.pair_group == pair_group && mg.is_zero_replica())
        .map(|mg| mg.name.clone())
        .collect();
    names.sort();
    names
}

/// §4.D step 4: open-pair scale-up for a requirement with no specific
/// `pair_group`. Returns the MachineGroup names to scale to 1 replica.
pub fn open_pair_scale_up(
    requirement: &Requirement,
    mgs: &[MachineGroupView],
    free_nodes: &[NodeView],
    taken: &[String],
) -> Vec<String> {
    debug_assert!(requirement.pair_group.is_none());
    let taken_set: BTreeSet<&str> = taken.iter().map(String::as_str).collect();

    // a. discount by free nodes of this size whose pair group is untaken.
    let matching_free_nodes: Vec<&NodeView> = free_nodes
        .iter()
        .filter(|n| n.matches_size(&requirement.size))
        .filter(|n| n.pair_group.as_deref().is_some_and(|pg| !taken_set.contains(pg)))
        .collect();
    let covered_by_free_nodes: BTreeSet<&str> =
        matching_free_nodes.iter().filter_map(|n| n.pair_group.as_deref()).collect();

    let mut remaining = requirement.count.saturating_sub(matching_free_nodes.len() as u32);
    if remaining == 0 {
        return Vec::new();
    }

    // b. discount by pending MGs of this size that aren't already accounted
    // for by the free-node set or a taken pair group.
    let mut pending_mgs: Vec<&MachineGroupView> = mgs
        .iter()
        .filter(|mg| mg.size == requirement.size)
        .filter(|mg| mg.is_pending())
        .filter(|mg| !taken_set.contains(mg.pair_group.as_str()))
        .filter(|mg| !covered_by_free_nodes.contains(mg.pair_group.as_str()))
        .collect();
    pending_mgs.sort_by(|a, b| a.name.cmp(&b.name));

    remaining = remaining.saturating_sub(pending_mgs.len() as u32);
    if remaining == 0 {
        return Vec::new();
    }

    let mut to_scale: Vec<String> = Vec::new();

    // c. a pending MG with a 0-replica sibling: scale the sibling first so
    // the pending pair completes instead of opening a third pair.
    for pending in &pending_mgs {
        if remaining == 0 {
            break;
        }
        if let Some(sibling) = mgs.iter().find(|mg| {
            mg.size == pending.size && mg.pair_group == pending.pair_group && mg.name != pending.name && mg.is_zero_replica()
        }) {
            to_scale.push(sibling.name.clone());
            remaining -= 1;
        }
    }
    if remaining == 0 {
        return to_scale;
    }

    // d. pick whole zero-replica pairs deterministically until satisfied.
    let mut zero_replica: Vec<&MachineGroupView> = mgs
        .iter()
        .filter(|mg| mg.size == requirement.size)
        .filter(|mg| mg.is_zero_replica())
        .filter(|mg| !taken_set.contains(mg.pair_group.as_str()))
        .filter(|mg| !to_scale.contains(&mg.name))
        .collect();
    zero_replica.sort_by(|a, b| a.name.cmp(&b.name));

    let mut by_pair_group: BTreeMap<&str, Vec<&MachineGroupView>> = BTreeMap::new();
    for mg in &zero_replica {
        by_pair_group.entry(mg.pair_group.as_str()).or_default().push(mg);
    }

    let mut pair_groups: Vec<&str> = by_pair_group.keys().copied().collect();
    pair_groups.sort();

    for pg in pair_groups {
        if remaining == 0 {
            break;
        }
        let mut members = by_pair_group[pg].clone();
        if members.len() < 2 {
            continue;
        }
        members.sort_by(|a, b| a.name.cmp(&b.name));
        to_scale.push(members[0].name.clone());
        to_scale.push(members[1].name.clone());
        remaining = remaining.saturating_sub(2);
    }

    to_scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn mg(name: &str, size: &str, pair_group: &str, replicas: i32, available: i32) -> MachineGroupView {
        MachineGroupView {
            name: name.into(),
            size: size.into(),
            pair_group: pair_group.into(),
            zone: "a".into(),
            replicas,
            available_replicas: available,
            request_serving: true,
            min_size: 0,
            max_size: 1,
        }
    }

    fn free_node(name: &str, size: &str, pair_group: &str) -> NodeView {
        NodeView {
            name: name.into(),
            zone: "a".into(),
            size: Some(size.into()),
            pair_group: Some(pair_group.into()),
            hosted_cluster: None,
            go_memory_limit: None,
            load_balancer_subnets: None,
            request_serving_component: true,
            creation_timestamp: Utc::now(),
            instance_type: None,
            region: None,
        }
    }

    #[test]
    fn compute_requirements_pairs_and_drops_unpaired() {
        let pods = vec![
            PendingPodView { name: "p1".into(), owner_key: "placeholder-small-0".into(), size: "small".into(), required_pair_group: None },
            PendingPodView { name: "p2".into(), owner_key: "placeholder-small-0".into(), size: "small".into(), required_pair_group: None },
            PendingPodView { name: "p3".into(), owner_key: "placeholder-small-1".into(), size: "small".into(), required_pair_group: None },
        ];
        let reqs = compute_requirements(&pods);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].count, 2);
        assert_eq!(reqs[0].pair_group, None);
    }

    #[test]
    fn compute_requirements_keeps_lone_pod_with_explicit_pair_group() {
        let pods = vec![PendingPodView {
            name: "p1".into(),
            owner_key: "ns-gc1".into(),
            size: "small".into(),
            required_pair_group: Some("p1".into()),
        }];
        let reqs = compute_requirements(&pods);
        assert_eq!(reqs, vec![Requirement { size: "small".into(), pair_group: Some("p1".into()), count: 1 }]);
    }

    #[test]
    fn targeted_scale_up_only_zero_replica_matching_pair() {
        let mgs = vec![mg("mg-a", "small", "p1", 0, 0), mg("mg-b", "small", "p1", 0, 0), mg("mg-c", "small", "p2", 0, 0)];
        let req = Requirement { size: "small".into(), pair_group: Some("p1".into()), count: 2 };
        assert_eq!(targeted_scale_up(&req, &mgs), vec!["mg-a".to_string(), "mg-b".to_string()]);
    }

    #[test]
    fn open_pair_discounts_free_nodes_fully() {
        let req = Requirement { size: "small".into(), pair_group: None, count: 1 };
        let free = vec![free_node("n1", "small", "p1")];
        let mgs = vec![mg("mg-a", "small", "p2", 0, 0), mg("mg-b", "small", "p2", 0, 0)];
        assert!(open_pair_scale_up(&req, &mgs, &free, &[]).is_empty());
    }

    #[test]
    fn open_pair_completes_pending_sibling_before_opening_new_pair() {
        let req = Requirement { size: "small".into(), pair_group: None, count: 1 };
        let mgs = vec![
            mg("mg-pending", "small", "p1", 1, 0), // already scaling up, no nodes yet
            mg("mg-sibling", "small", "p1", 0, 0),
            mg("mg-c", "small", "p2", 0, 0),
            mg("mg-d", "small", "p2", 0, 0),
        ];
        let result = open_pair_scale_up(&req, &mgs, &[], &[]);
        assert_eq!(result, vec!["mg-sibling".to_string()]);
    }

    #[test]
    fn open_pair_picks_deterministic_idle_pair_when_no_pending_sibling() {
        let req = Requirement { size: "small".into(), pair_group: None, count: 2 };
        let mgs = vec![
            mg("mg-z1", "small", "pz", 0, 0),
            mg("mg-z2", "small", "pz", 0, 0),
            mg("mg-a1", "small", "pa", 0, 0),
            mg("mg-a2", "small", "pa", 0, 0),
        ];
        let result = open_pair_scale_up(&req, &mgs, &[], &[]);
        assert_eq!(result, vec!["mg-a1".to_string(), "mg-a2".to_string()]);
    }

    #[test]
    fn open_pair_skips_taken_pair_groups() {
        let req = Requirement { size: "small".into(), pair_group: None, count: 2 };
        let mgs = vec![
            mg("mg-a1", "small", "pa", 0, 0),
            mg("mg-a2", "small", "pa", 0, 0),
            mg("mg-b1", "small", "pb", 0, 0),
            mg("mg-b2", "small", "pb", 0, 0),
        ];
        let result = open_pair_scale_up(&req, &mgs, &[], &["pa".to_string()]);
        assert_eq!(result, vec!["mg-b1".to_string(), "mg-b2".to_string()]);
    }
}
