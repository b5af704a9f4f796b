//! `SchedulingConfiguration`: the singleton sizing configuration (§3, §6).
//!
//! Read-only to the core ("authored externally"); every controller treats
//! it as the single source of truth for size-class criteria and effects.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SizeClassCriteria {
    pub from: i64,
    pub to: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagementSpec {
    /// Number of generic placeholder deployments to keep warm for this size.
    #[serde(default)]
    pub placeholders: u32,

    /// Non-serving nodes to provision per zone, attributable to this size
    /// (§4.F).
    pub non_serving_nodes_per_zone: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequestOverride {
    pub deployment: String,
    pub container: String,
    pub memory: Option<String>,
    pub cpu: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EffectsSpec {
    pub go_mem_limit: Option<String>,
    pub control_plane_priority_class: Option<String>,
    pub etcd_priority_class: Option<String>,
    pub api_critical_priority_class: Option<String>,
    pub max_requests_in_flight: Option<i64>,
    pub max_mutating_requests_in_flight: Option<i64>,
    pub mhc_timeout: Option<String>,
    #[serde(default)]
    pub resource_requests: Vec<ResourceRequestOverride>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SizeClassSpec {
    pub name: String,
    pub criteria: SizeClassCriteria,
    pub management: ManagementSpec,
    #[serde(default)]
    pub effects: EffectsSpec,
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
// Cluster-scoped: omitting `namespaced` makes this a cluster-scoped CRD,
// matching the singleton named `cluster` (§6).
#[kube(
    group = "hypershift.openshift.io",
    version = "v1alpha1",
    kind = "SchedulingConfiguration",
    plural = "schedulingconfigurations",
    shortname = "schedcfg"
)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingConfigurationSpec {
    pub sizes: Vec<SizeClassSpec>,

    /// Additional non-serving buffer per zone, added on top of the
    /// per-size-class contribution (§4.F step 3).
    #[serde(default)]
    pub non_serving_buffer_per_zone: u32,

    /// §5/§7: "Sizing Configuration present and `valid=true`" is a
    /// precondition for every controller that consumes it.
    #[serde(default)]
    pub valid: bool,
}

impl SchedulingConfigurationSpec {
    pub fn size(&self, name: &str) -> Option<&SizeClassSpec> {
        self.sizes.iter().find(|s| s.name == name)
    }

    /// The smallest size class by `criteria.from`, used to attribute GCs
    /// without a size label (§4.F step 2).
    pub fn smallest_size(&self) -> Option<&SizeClassSpec> {
        self.sizes.iter().min_by_key(|s| s.criteria.from)
    }
}
