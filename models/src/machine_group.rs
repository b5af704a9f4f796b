//! `MachineGroup`: a cloud-managed, replica-scaled set producing Nodes.
//!
//! Models the `scale` subresource contract of §6 as an ordinary spec field
//! (`replicas`). Each scaling controller (`upscaler`, `downscaler`,
//! `nonserving_sizer`) patches just that field with a `Patch::Merge` of
//! `{"spec": {"replicas": N}}`, so callers can't accidentally clobber the
//! template.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineGroupTemplate {
    pub size: String,
    pub pair_group: String,
    pub request_serving: bool,
    pub machine_type: String,
    pub zone: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// For each `(size, pairGroup)` there exist exactly two MachineGroups, one
/// per zone -- together they form a pair (§3 invariant).
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "hypershift.openshift.io",
    version = "v1alpha1",
    kind = "MachineGroup",
    plural = "machinegroups",
    namespaced,
    status = "MachineGroupStatus",
    shortname = "mg"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineGroupSpec {
    pub template: MachineGroupTemplate,

    /// The mutable scale value (§6: "the `scale` subresource is patched
    /// with `{spec.replicas: 0|1|N}`").
    #[serde(default)]
    pub replicas: i32,

    pub min_size: i32,
    pub max_size: i32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineGroupStatus {
    #[serde(default)]
    pub available_replicas: i32,
}

impl MachineGroup {
    pub fn size(&self) -> &str {
        &self.spec.template.size
    }

    pub fn pair_group(&self) -> &str {
        &self.spec.template.pair_group
    }

    pub fn is_non_request_serving(&self) -> bool {
        !self.spec.template.request_serving
    }

    /// "pending": scaled up but no node has reported available yet.
    pub fn is_pending(&self) -> bool {
        self.spec.replicas > 0 && self.status.as_ref().map(|s| s.available_replicas).unwrap_or(0) == 0
    }

    pub fn is_zero_replica(&self) -> bool {
        self.spec.replicas == 0
    }
}
