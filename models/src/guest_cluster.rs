//! `GuestCluster`: a hosted control plane the management cluster serves.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How a Guest Cluster wants its control-plane pods placed.
///
/// Only `DedicatedRequestServing` is handled by the core; any other mode
/// means "not our problem" (§4.C preconditions) and reconcilers return
/// without error on seeing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum TopologyMode {
    DedicatedRequestServing,
    Shared,
}

/// A hosted control plane.
///
/// `spec` is authored externally (§3: "created externally; mutated by
/// Scheduler-Sizer to add scheduling annotations; destroyed externally").
/// The scheduling annotations themselves live on `metadata.annotations`
/// (see `models::constants` for the recognized keys), not in `status` --
/// this matches the real object's contract in §6, where annotations are
/// read back by the higher-level controller that owns GC status conditions.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "hypershift.openshift.io",
    version = "v1alpha1",
    kind = "GuestCluster",
    plural = "guestclusters",
    namespaced,
    status = "GuestClusterStatus",
    shortname = "gc"
)]
#[serde(rename_all = "camelCase")]
pub struct GuestClusterSpec {
    /// Named capacity tier (`small`, `medium`, `large`, ...). Absent means
    /// "no size class resolvable yet" (§4.C precondition).
    pub size_class: Option<String>,

    pub topology_mode: TopologyMode,

    /// While in the future, Scheduler-Sizer requeues without writing
    /// (§8 boundary behavior) instead of treating the GC as ready.
    pub paused_until: Option<DateTime<Utc>>,

    /// Free-form labels/annotations mirror; present for completeness, the
    /// authoritative copy is always `ObjectMeta::annotations`.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GuestClusterStatus {
    pub observed_generation: Option<i64>,
}

impl GuestCluster {
    /// `<namespace>-<name>`, the stable identity used in labels/taints/annotations.
    pub fn key(&self) -> String {
        use kube::ResourceExt;
        crate::constants::guest_cluster_key(&self.namespace().unwrap_or_default(), &self.name_any())
    }
}
