//! Pure, client-free decision logic for components B-F.
//!
//! Every function here operates on plain views of store objects and
//! returns what to do, not how to do it over the wire -- the `controllers`
//! module owns translating these decisions into `kube::Api` calls. Keeping
//! this layer free of `kube::Client` is what lets the bulk of B-F's logic
//! (the hardest 60% of the budget, per §2) run under ordinary
//! `#[cfg(test)]` unit tests with no mocked cluster.

pub mod downscale_calc;
pub mod nonserving_calc;
pub mod pairs;
pub mod placeholder_spec;
pub mod taken;
pub mod upscale_calc;

use chrono::{DateTime, Utc};

/// A read-only projection of a `k8s_openapi::api::core::v1::Node` carrying
/// only the fields §3/§4 reason about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeView {
    pub name: String,
    pub zone: String,
    pub size: Option<String>,
    pub pair_group: Option<String>,
    /// GC key (`<namespace>-<name>`) this node is bound to, if any.
    pub hosted_cluster: Option<String>,
    pub go_memory_limit: Option<String>,
    pub load_balancer_subnets: Option<String>,
    pub request_serving_component: bool,
    pub creation_timestamp: DateTime<Utc>,
    /// Cloud instance type, e.g. `m5.xlarge` (§10.6 goMemoryLimit fallback).
    pub instance_type: Option<String>,
    pub region: Option<String>,
}

impl NodeView {
    pub fn is_bound(&self) -> bool {
        self.hosted_cluster.is_some()
    }

    pub fn is_free(&self) -> bool {
        self.request_serving_component && self.hosted_cluster.is_none()
    }

    pub fn matches_size(&self, size: &str) -> bool {
        self.size.as_deref() == Some(size)
    }
}

/// A read-only projection of a `models::MachineGroup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineGroupView {
    pub name: String,
    pub size: String,
    pub pair_group: String,
    pub zone: String,
    pub replicas: i32,
    pub available_replicas: i32,
    pub request_serving: bool,
    pub min_size: i32,
    pub max_size: i32,
}

impl MachineGroupView {
    pub fn is_zero_replica(&self) -> bool {
        self.replicas == 0
    }

    pub fn is_pending(&self) -> bool {
        self.replicas > 0 && self.available_replicas == 0
    }
}

/// A pending placeholder/holding-deployment pod, reduced to what Up-Scaler
/// needs (§4.D).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPodView {
    pub name: String,
    /// The selector label identifying which PD/holding-deployment produced
    /// this pod, e.g. `placeholder-small-0` or `<namespace>-<name>`.
    pub owner_key: String,
    pub size: String,
    /// `Some(p)` when the pod's node affinity pins it to one pair group
    /// (a holding deployment completing a partial pair, or a single
    /// remaining pair group after `NotIn` narrows to one option).
    pub required_pair_group: Option<String>,
}

pub(crate) fn sorted<T: Ord + Clone>(mut items: Vec<T>) -> Vec<T> {
    items.sort();
    items
}
