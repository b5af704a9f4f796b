//! Async, `kube::Client`-backed reconcilers wiring `logic::*` decisions onto
//! real API calls.
//!
//! Every reconciler here is deliberately thin: collect state, build plain
//! `logic` views, hand them to a pure function, translate the answer into
//! patches. The `kube::runtime::Controller` construction in each `run()`
//! realizes §5's per-key serialization and bounded concurrency without a
//! hand-rolled work queue (SPEC_FULL §10.7).

pub mod downscaler;
pub mod node_reaper;
pub mod nonserving_sizer;
pub mod placeholder_manager;
pub mod scheduler_sizer;
pub mod upscaler;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};

use models::{MachineGroup, LABEL_GO_MEMORY_LIMIT, LABEL_HOSTED_CLUSTER, LABEL_LOAD_BALANCER_SUBNETS, LABEL_NODE_SIZE, LABEL_PAIR_GROUP, LABEL_PLACEHOLDER, LABEL_REQUEST_SERVING_COMPONENT};

use crate::cache::InstanceTypeCache;
use crate::config::RuntimeConfig;
use crate::error::{Error, ErrorBucket};
use crate::logic::{MachineGroupView, NodeView, PendingPodView};
use crate::metrics::Metrics;

const EVENT_REPORTER: &str = "rss-core";

pub const TOPOLOGY_ZONE_LABEL: &str = "topology.kubernetes.io/zone";
pub const TOPOLOGY_REGION_LABEL: &str = "topology.kubernetes.io/region";
pub const INSTANCE_TYPE_LABEL: &str = "node.kubernetes.io/instance-type";

/// Shared state handed to every reconciler as `kube::runtime::Controller`'s
/// context parameter.
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub config: Arc<RuntimeConfig>,
    pub cache: Arc<InstanceTypeCache>,
    pub metrics: Arc<Metrics>,
}

pub fn node_view(node: &Node) -> NodeView {
    let labels = node.metadata.labels.clone().unwrap_or_default();
    NodeView {
        name: node.name_any(),
        zone: labels.get(TOPOLOGY_ZONE_LABEL).cloned().unwrap_or_default(),
        size: labels.get(LABEL_NODE_SIZE).cloned(),
        pair_group: labels.get(LABEL_PAIR_GROUP).cloned(),
        hosted_cluster: labels.get(LABEL_HOSTED_CLUSTER).cloned(),
        go_memory_limit: labels.get(LABEL_GO_MEMORY_LIMIT).cloned(),
        load_balancer_subnets: labels.get(LABEL_LOAD_BALANCER_SUBNETS).cloned(),
        request_serving_component: labels.get(LABEL_REQUEST_SERVING_COMPONENT).map(|v| v == "true").unwrap_or(false),
        creation_timestamp: node.metadata.creation_timestamp.as_ref().map(|t| t.0).unwrap_or_else(Utc::now),
        instance_type: labels.get(INSTANCE_TYPE_LABEL).cloned(),
        region: labels.get(TOPOLOGY_REGION_LABEL).cloned(),
    }
}

pub fn machine_group_view(mg: &MachineGroup) -> MachineGroupView {
    MachineGroupView {
        name: mg.name_any(),
        size: mg.spec.template.size.clone(),
        pair_group: mg.spec.template.pair_group.clone(),
        zone: mg.spec.template.zone.clone(),
        replicas: mg.spec.replicas,
        available_replicas: mg.status.as_ref().map(|s| s.available_replicas).unwrap_or(0),
        request_serving: mg.spec.template.request_serving,
        min_size: mg.spec.min_size,
        max_size: mg.spec.max_size,
    }
}

/// Extracts the single `In` value for `key` from a Pod's required node
/// affinity terms, if any -- used to recover the `pairGroup` a holding
/// deployment's pod was pinned to (§4.C step 7). We deliberately do not
/// attempt to resolve a `NotIn` list down to "the one remaining option";
/// per §9's Open Questions this requires re-deriving taken pair groups from
/// live state rather than the pod spec alone, and is left to the next
/// reconcile of Scheduler-Sizer/Up-Scaler, which always re-reads fresh state.
fn pinned_pair_group(pod: &Pod) -> Option<String> {
    let terms = pod.spec.as_ref()?.affinity.as_ref()?.node_affinity.as_ref()?.required_during_scheduling_ignored_during_execution.as_ref()?;
    for term in &terms.node_selector_terms {
        for expr in term.match_expressions.as_ref()?.iter() {
            if expr.key == LABEL_PAIR_GROUP && expr.operator == "In" {
                if let Some(values) = &expr.values {
                    if values.len() == 1 {
                        return values.first().cloned();
                    }
                }
            }
        }
    }
    None
}

fn pod_size(pod: &Pod) -> Option<String> {
    let terms = pod.spec.as_ref()?.affinity.as_ref()?.node_affinity.as_ref()?.required_during_scheduling_ignored_during_execution.as_ref()?;
    for term in &terms.node_selector_terms {
        for expr in term.match_expressions.as_ref()?.iter() {
            if expr.key == LABEL_NODE_SIZE && expr.operator == "In" {
                if let Some(values) = &expr.values {
                    return values.first().cloned();
                }
            }
        }
    }
    None
}

/// §4.D step 1: a pod is "pending" for Up-Scaler's purposes when it has no
/// assigned node yet.
pub fn is_unscheduled(pod: &Pod) -> bool {
    pod.spec.as_ref().and_then(|s| s.node_name.as_ref()).is_none()
}

pub fn pending_pod_view(pod: &Pod) -> Option<PendingPodView> {
    let labels = pod.metadata.labels.clone().unwrap_or_default();
    let owner_key = labels.get(LABEL_PLACEHOLDER)?.clone();
    let size = pod_size(pod)?;
    Some(PendingPodView { name: pod.name_any(), owner_key, size, required_pair_group: pinned_pair_group(pod) })
}

/// `takenPairGroups` (§4.B, §4.D), recomputed fresh on every reconcile per §9.
pub fn taken_pair_groups(nodes: &[NodeView], pending_pods: &[PendingPodView]) -> Vec<String> {
    crate::logic::taken::compute_taken_pair_groups(nodes, pending_pods)
}

/// Renders a `nodeSize=<size>` style single-label-equality selector string.
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",")
}

/// Splits a placeholder/holding deployment name of the form
/// `placeholder-<size>-<index>` back into its parts; returns `None` for GC
/// holding deployment names (`<namespace>-<name>`), which carry no index.
pub fn parse_placeholder_name(name: &str) -> Option<(&str, u32)> {
    let rest = name.strip_prefix("placeholder-")?;
    let (size, index) = rest.rsplit_once('-')?;
    Some((size, index.parse().ok()?))
}

/// Publishes a Kubernetes Event for the two error buckets an operator should
/// actually look at (SPEC_FULL §10.9): `Configuration` and `PermanentInvalid`.
/// Transient and precondition-not-met buckets resolve themselves on the next
/// reconcile and would just be noise on the object's event feed.
pub async fn record_error_event<K>(client: &Client, object: &K, err: &Error)
where
    K: Resource<DynamicType = ()>,
{
    let reason = match err.bucket() {
        ErrorBucket::Configuration => "ConfigurationError",
        ErrorBucket::PermanentInvalid => "PermanentInvalidInput",
        _ => return,
    };
    let recorder = Recorder::new(client.clone(), Reporter::from(EVENT_REPORTER.to_string()), object.object_ref(&()));
    let event = Event {
        type_: EventType::Warning,
        reason: reason.to_string(),
        note: Some(err.to_string()),
        action: "Reconcile".to_string(),
        secondary: None,
    };
    if let Err(e) = recorder.publish(event).await {
        tracing::warn!(error = %e, "failed to publish error event");
    }
}

/// A placeholder rollout is ready when its available replicas match desired
/// and the status reflects the current generation (§5: "ready when the
/// deployment's availableReplicas equals its desired replicas and
/// observedGeneration matches generation").
pub fn is_deployment_ready(dep: &Deployment) -> bool {
    let Some(spec) = &dep.spec else { return false };
    let Some(status) = &dep.status else { return false };
    let desired = spec.replicas.unwrap_or(0);
    let available = status.available_replicas.unwrap_or(0);
    let generation_matches = match (dep.metadata.generation, status.observed_generation) {
        (Some(g), Some(og)) => g == og,
        _ => true,
    };
    desired > 0 && available == desired && generation_matches
}
