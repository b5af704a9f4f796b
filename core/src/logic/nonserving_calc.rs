//! Non-Serving Group Sizer pure decision logic (§4.F).

use std::collections::BTreeMap;

use models::SchedulingConfigurationSpec;

use super::MachineGroupView;

/// A Guest Cluster reduced to the one field this sizer cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcSizeView {
    pub size_class: Option<String>,
}

/// §4.F step 1: the configuration must be valid, every size class must
/// declare `nonServingNodesPerZone`, and there must be exactly three
/// non-serving MachineGroups with a single consistent `min`/`max` pair --
/// anything else is a Configuration error (§7): log and return, no retry.
pub fn validate(config: &SchedulingConfigurationSpec, non_serving_mgs: &[MachineGroupView]) -> Result<(), String> {
    if !config.valid {
        return Err("scheduling configuration is not valid".to_string());
    }
    for size in &config.sizes {
        if size.management.non_serving_nodes_per_zone.is_none() {
            return Err(format!("size class {} has no nonServingNodesPerZone", size.name));
        }
    }
    if non_serving_mgs.len() != 3 {
        return Err(format!("expected exactly 3 non-serving machine groups, found {}", non_serving_mgs.len()));
    }
    let (min, max) = (non_serving_mgs[0].min_size, non_serving_mgs[0].max_size);
    if non_serving_mgs.iter().any(|mg| mg.min_size != min || mg.max_size != max) {
        return Err("non-serving machine groups have inconsistent min/max annotations".to_string());
    }
    Ok(())
}

/// §4.F step 2: count GCs by size class, attributing unlabeled GCs to the
/// smallest declared size class.
pub fn count_gcs_by_size(gcs: &[GcSizeView], config: &SchedulingConfigurationSpec) -> BTreeMap<String, u32> {
    let fallback = config.smallest_size().map(|s| s.name.clone());
    let mut counts = BTreeMap::new();
    for gc in gcs {
        if let Some(size) = gc.size_class.clone().or_else(|| fallback.clone()) {
            *counts.entry(size).or_insert(0) += 1;
        }
    }
    counts
}

/// §4.F step 3: `needed = sum(sizeCount[s] * nonServingNodesPerZone[s]) + buffer`.
pub fn needed_replicas(config: &SchedulingConfigurationSpec, counts: &BTreeMap<String, u32>) -> u32 {
    let mut needed = 0u32;
    for size in &config.sizes {
        let count = counts.get(&size.name).copied().unwrap_or(0);
        let per_zone = size.management.non_serving_nodes_per_zone.unwrap_or(0);
        needed += count * per_zone;
    }
    needed + config.non_serving_buffer_per_zone
}

/// §4.F step 4: clamp into `[min, max]`.
pub fn clamp(needed: u32, min: i32, max: i32) -> i32 {
    (needed as i32).clamp(min.min(max), max)
}

/// §4.F step 5: MachineGroups whose current replica count doesn't match
/// `desired`, i.e. what the controller still needs to patch.
pub fn mismatched(non_serving_mgs: &[MachineGroupView], desired: i32) -> Vec<String> {
    let mut names: Vec<String> =
        non_serving_mgs.iter().filter(|mg| mg.replicas != desired).map(|mg| mg.name.clone()).collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::{EffectsSpec, ManagementSpec, SizeClassCriteria, SizeClassSpec};

    fn config(sizes: Vec<(&str, i64, u32)>, buffer: u32, valid: bool) -> SchedulingConfigurationSpec {
        SchedulingConfigurationSpec {
            sizes: sizes
                .into_iter()
                .map(|(name, from, per_zone)| SizeClassSpec {
                    name: name.to_string(),
                    criteria: SizeClassCriteria { from, to: None },
                    management: ManagementSpec { placeholders: 0, non_serving_nodes_per_zone: Some(per_zone) },
                    effects: EffectsSpec::default(),
                })
                .collect(),
            non_serving_buffer_per_zone: buffer,
            valid,
        }
    }

    fn mg(name: &str, replicas: i32, min: i32, max: i32) -> MachineGroupView {
        MachineGroupView {
            name: name.into(),
            size: "non-serving".into(),
            pair_group: "".into(),
            zone: "a".into(),
            replicas,
            available_replicas: replicas,
            request_serving: false,
            min_size: min,
            max_size: max,
        }
    }

    #[test]
    fn validate_rejects_invalid_configuration() {
        let cfg = config(vec![("small", 0, 1)], 0, false);
        assert!(validate(&cfg, &[mg("a", 0, 0, 5), mg("b", 0, 0, 5), mg("c", 0, 0, 5)]).is_err());
    }

    #[test]
    fn validate_requires_exactly_three_groups() {
        let cfg = config(vec![("small", 0, 1)], 0, true);
        assert!(validate(&cfg, &[mg("a", 0, 0, 5), mg("b", 0, 0, 5)]).is_err());
    }

    #[test]
    fn validate_requires_consistent_min_max() {
        let cfg = config(vec![("small", 0, 1)], 0, true);
        let mgs = vec![mg("a", 0, 0, 5), mg("b", 0, 0, 5), mg("c", 0, 1, 6)];
        assert!(validate(&cfg, &mgs).is_err());
    }

    #[test]
    fn unlabeled_gcs_attributed_to_smallest_size() {
        let cfg = config(vec![("small", 0, 1), ("large", 100, 3)], 0, true);
        let gcs = vec![GcSizeView { size_class: None }, GcSizeView { size_class: Some("large".into()) }];
        let counts = count_gcs_by_size(&gcs, &cfg);
        assert_eq!(counts.get("small").copied(), Some(1));
        assert_eq!(counts.get("large").copied(), Some(1));
    }

    #[test]
    fn needed_replicas_sums_and_adds_buffer() {
        let cfg = config(vec![("small", 0, 2), ("large", 100, 3)], 4, true);
        let mut counts = BTreeMap::new();
        counts.insert("small".to_string(), 5u32);
        counts.insert("large".to_string(), 2u32);
        // 5*2 + 2*3 + 4 = 10 + 6 + 4 = 20
        assert_eq!(needed_replicas(&cfg, &counts), 20);
    }

    #[test]
    fn clamp_bounds_into_range() {
        assert_eq!(clamp(2, 3, 10), 3);
        assert_eq!(clamp(20, 3, 10), 10);
        assert_eq!(clamp(5, 3, 10), 5);
    }

    #[test]
    fn mismatched_lists_only_groups_needing_a_patch() {
        let mgs = vec![mg("a", 5, 0, 10), mg("b", 3, 0, 10), mg("c", 5, 0, 10)];
        assert_eq!(mismatched(&mgs, 5), vec!["b".to_string()]);
    }
}
