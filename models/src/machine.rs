//! `Machine`: a single provisioned unit of a MachineGroup.
//!
//! Minimal by design (§1 non-goal: "the core does not terminate cloud
//! machines directly") -- it exists only so Down-Scaler can resolve a Node
//! back to the MachineGroup that owns it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "hypershift.openshift.io",
    version = "v1alpha1",
    kind = "Machine",
    plural = "machines",
    namespaced,
    shortname = "mach"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Back-reference to the owning MachineGroup (mirrored onto
    /// `ObjectMeta::labels[LABEL_MACHINE_SET]` for label-selector listing).
    pub machine_group: String,

    /// `<namespace>/<name>` of the correlated Node, once provisioning
    /// completes. `None` while the cloud machine is still booting.
    pub node_ref: Option<String>,
}
