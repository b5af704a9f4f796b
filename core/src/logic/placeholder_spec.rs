//! Pure builder for placeholder/holding-deployment specs (§4.B, §4.C step 7).
//!
//! Both the generic Placeholder Manager and Scheduler-Sizer's holding
//! deployment need the same pod template: required anti-affinity across
//! zone and host, required anti-affinity against every other placeholder
//! pod, and node affinity pinning `nodeSize` and excluding taken pair
//! groups. Building it once here keeps the two controllers from drifting.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Affinity, Container, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, PodAffinityTerm,
    PodAntiAffinity, PodSpec, PodTemplateSpec, Toleration,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement, ObjectMeta};

use models::constants::{
    LABEL_NODE_SIZE, LABEL_PAIR_GROUP, LABEL_PLACEHOLDER, LABEL_REQUEST_SERVING_COMPONENT, TAINT_CONTROL_PLANE,
    TAINT_REQUEST_SERVING_COMPONENT,
};

const TOPOLOGY_ZONE: &str = "topology.kubernetes.io/zone";
const TOPOLOGY_HOST: &str = "kubernetes.io/hostname";

/// Everything the holding-deployment/placeholder-deployment pod template
/// depends on beyond the selector label, already sorted for determinism by
/// the caller (§4.B: "when the takenPairGroups list is materialized it is
/// sorted").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderSpec {
    pub name: String,
    pub namespace: String,
    pub size: String,
    pub replicas: i32,
    /// If `Some(pg)`, node affinity pins `pairGroup = pg` (Scheduler-Sizer's
    /// partial-pair completion path). Otherwise the pod must land on a pair
    /// group absent from `excluded_pair_groups`.
    pub required_pair_group: Option<String>,
    pub excluded_pair_groups: Vec<String>,
}

fn selector_label(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(LABEL_PLACEHOLDER.to_string(), name.to_string())])
}

fn node_selector_term(spec: &PlaceholderSpec) -> NodeSelectorTerm {
    let mut expressions = vec![
        NodeSelectorRequirement {
            key: LABEL_REQUEST_SERVING_COMPONENT.to_string(),
            operator: "In".to_string(),
            values: Some(vec!["true".to_string()]),
        },
        NodeSelectorRequirement {
            key: LABEL_NODE_SIZE.to_string(),
            operator: "In".to_string(),
            values: Some(vec![spec.size.clone()]),
        },
    ];

    match &spec.required_pair_group {
        Some(pg) => expressions.push(NodeSelectorRequirement {
            key: LABEL_PAIR_GROUP.to_string(),
            operator: "In".to_string(),
            values: Some(vec![pg.clone()]),
        }),
        None if !spec.excluded_pair_groups.is_empty() => expressions.push(NodeSelectorRequirement {
            key: LABEL_PAIR_GROUP.to_string(),
            operator: "NotIn".to_string(),
            values: Some(spec.excluded_pair_groups.clone()),
        }),
        None => {}
    }

    NodeSelectorTerm { match_expressions: Some(expressions), match_fields: None }
}

/// Builds the pod template shared by a generic placeholder deployment and a
/// GC holding deployment: required pod anti-affinity (zone + host, and
/// against every other placeholder pod) plus required node affinity (§4.B).
pub fn pod_template(spec: &PlaceholderSpec) -> PodTemplateSpec {
    let labels = selector_label(&spec.name);

    let required_terms = vec![
        PodAffinityTerm {
            label_selector: Some(LabelSelector { match_labels: Some(labels.clone()), ..Default::default() }),
            topology_key: TOPOLOGY_ZONE.to_string(),
            ..Default::default()
        },
        PodAffinityTerm {
            label_selector: Some(LabelSelector { match_labels: Some(labels.clone()), ..Default::default() }),
            topology_key: TOPOLOGY_HOST.to_string(),
            ..Default::default()
        },
        PodAffinityTerm {
            label_selector: Some(LabelSelector {
                match_expressions: Some(vec![LabelSelectorRequirement {
                    key: LABEL_PLACEHOLDER.to_string(),
                    operator: "Exists".to_string(),
                    values: None,
                }]),
                ..Default::default()
            }),
            topology_key: TOPOLOGY_HOST.to_string(),
            ..Default::default()
        },
    ];

    let affinity = Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: Some(required_terms),
            ..Default::default()
        }),
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![node_selector_term(spec)],
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    let tolerations = vec![
        Toleration { key: Some(TAINT_CONTROL_PLANE.to_string()), effect: Some("NoSchedule".to_string()), ..Default::default() },
        Toleration {
            key: Some(TAINT_REQUEST_SERVING_COMPONENT.to_string()),
            effect: Some("NoSchedule".to_string()),
            ..Default::default()
        },
    ];

    PodTemplateSpec {
        metadata: Some(ObjectMeta { labels: Some(labels), ..Default::default() }),
        spec: Some(PodSpec {
            affinity: Some(affinity),
            tolerations: Some(tolerations),
            containers: vec![Container {
                name: "pause".to_string(),
                image: Some("registry.k8s.io/pause:3.9".to_string()),
                ..Default::default()
            }],
            priority_class_name: None,
            ..Default::default()
        }),
    }
}

/// Builds the full Deployment object for either a generic PD or a GC
/// holding deployment -- callers distinguish the two only by `spec.name`
/// and `spec.namespace` (§6: `placeholder-<size>-<i>` vs `<namespace>-<name>`).
pub fn deployment(spec: &PlaceholderSpec) -> Deployment {
    let labels = selector_label(&spec.name);
    Deployment {
        metadata: ObjectMeta { name: Some(spec.name.clone()), namespace: Some(spec.namespace.clone()), ..Default::default() },
        spec: Some(DeploymentSpec {
            replicas: Some(spec.replicas),
            selector: LabelSelector { match_labels: Some(labels), ..Default::default() },
            template: pod_template(spec),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(name: &str) -> PlaceholderSpec {
        PlaceholderSpec {
            name: name.into(),
            namespace: "hypershift-placeholders".into(),
            size: "small".into(),
            replicas: 2,
            required_pair_group: None,
            excluded_pair_groups: vec![],
        }
    }

    #[test]
    fn node_affinity_excludes_taken_pair_groups_when_unpinned() {
        let mut spec = base("placeholder-small-0");
        spec.excluded_pair_groups = vec!["p1".into(), "p2".into()];
        let term = node_selector_term(&spec);
        let exprs = term.match_expressions.unwrap();
        let pair_group_expr = exprs.iter().find(|e| e.key == LABEL_PAIR_GROUP).unwrap();
        assert_eq!(pair_group_expr.operator, "NotIn");
        assert_eq!(pair_group_expr.values.as_ref().unwrap(), &vec!["p1".to_string(), "p2".to_string()]);
    }

    #[test]
    fn node_affinity_pins_pair_group_when_completing_partial_pair() {
        let mut spec = base("ns-gc1");
        spec.required_pair_group = Some("p1".into());
        let term = node_selector_term(&spec);
        let exprs = term.match_expressions.unwrap();
        let pair_group_expr = exprs.iter().find(|e| e.key == LABEL_PAIR_GROUP).unwrap();
        assert_eq!(pair_group_expr.operator, "In");
        assert_eq!(pair_group_expr.values.as_ref().unwrap(), &vec!["p1".to_string()]);
    }

    #[test]
    fn pod_template_carries_both_tolerations() {
        let spec = base("placeholder-small-0");
        let template = pod_template(&spec);
        let tolerations = template.spec.unwrap().tolerations.unwrap();
        assert_eq!(tolerations.len(), 2);
    }

    #[test]
    fn pod_template_requires_zone_host_and_cross_placeholder_anti_affinity() {
        let spec = base("placeholder-small-0");
        let template = pod_template(&spec);
        let anti_affinity = template.spec.unwrap().affinity.unwrap().pod_anti_affinity.unwrap();
        let required = anti_affinity.required_during_scheduling_ignored_during_execution.unwrap();
        assert_eq!(required.len(), 3);
        assert_eq!(required[0].topology_key, TOPOLOGY_ZONE);
        assert_eq!(required[1].topology_key, TOPOLOGY_HOST);
        assert_eq!(required[2].topology_key, TOPOLOGY_HOST);
    }

    #[test]
    fn deployment_names_and_namespaces_pass_through() {
        let spec = base("clusters-c2");
        let dep = deployment(&spec);
        assert_eq!(dep.metadata.name.as_deref(), Some("clusters-c2"));
        assert_eq!(dep.spec.unwrap().replicas, Some(2));
    }
}
