//! Label, taint and annotation keys shared by every controller.
//!
//! Keeping these in one place is what lets Node Reaper, Placeholder Manager,
//! Scheduler-Sizer, and both autoscalers agree on what "bound", "free" and
//! "taken" mean without re-deriving the vocabulary per module.

/// Set on any Node that participates in request-serving scheduling at all.
pub const LABEL_REQUEST_SERVING_COMPONENT: &str = "hypershift.openshift.io/request-serving-component";

/// Size class of a Node or MachineGroup (`small`, `medium`, `large`, ...).
pub const LABEL_NODE_SIZE: &str = "hypershift.openshift.io/node-size";

/// Shared by the two Nodes (and two MachineGroups) of one allocation unit.
pub const LABEL_PAIR_GROUP: &str = "hypershift.openshift.io/pair-group";

/// `<namespace>-<name>` of the Guest Cluster a Node is bound to.
pub const LABEL_HOSTED_CLUSTER: &str = "hypershift.openshift.io/hosted-cluster";

pub const LABEL_HOSTED_CLUSTER_NAME: &str = "hypershift.openshift.io/hosted-cluster-name";
pub const LABEL_HOSTED_CLUSTER_NAMESPACE: &str = "hypershift.openshift.io/hosted-cluster-namespace";

/// Marks a MachineGroup as part of the non-request-serving pool (§4.F).
pub const LABEL_NON_REQUEST_SERVING: &str = "hypershift.openshift.io/non-request-serving";

/// Optional node label carrying the API-server Go memory limit to propagate.
pub const LABEL_GO_MEMORY_LIMIT: &str = "hypershift.openshift.io/go-memory-limit";

/// Optional node label carrying dot-separated load balancer subnets.
pub const LABEL_LOAD_BALANCER_SUBNETS: &str = "hypershift.openshift.io/load-balancer-subnets";

/// Placeholder Deployment / Pod selector label: `placeholder-<size>-<index>`
/// for generic PDs, or `<namespace>-<name>` for a GC holding deployment.
pub const LABEL_PLACEHOLDER: &str = "hypershift.openshift.io/placeholder";

/// Taint applied to a bound Node; value is the GC key (`<namespace>-<name>`).
pub const TAINT_HOSTED_CLUSTER: &str = "hypershift.openshift.io/hosted-cluster";

/// One of the two tolerations every placeholder/holding-deployment pod carries.
pub const TAINT_CONTROL_PLANE: &str = "hypershift.openshift.io/control-plane";
pub const TAINT_REQUEST_SERVING_COMPONENT: &str = "hypershift.openshift.io/request-serving-component";

/// Machine -> MachineGroup back-reference label.
pub const LABEL_MACHINE_SET: &str = "hypershift.openshift.io/machine-group";

/// Machine -> Node correlation annotation, value `<namespace>/<name>`.
pub const ANNOTATION_MACHINE_NODE_REF: &str = "hypershift.openshift.io/machine-node-ref";

// GC annotations written by Scheduler-Sizer (§6).
pub const ANNOTATION_SCHEDULED: &str = "hypershift.openshift.io/scheduled";
pub const ANNOTATION_GO_MEMORY_LIMIT: &str = "hypershift.openshift.io/go-memory-limit";
pub const ANNOTATION_NODE_ADDITIONAL_SELECTOR: &str =
    "hypershift.openshift.io/request-serving-node-additional-selector";
pub const ANNOTATION_LOAD_BALANCER_SUBNETS: &str = "hypershift.openshift.io/load-balancer-subnets";
pub const ANNOTATION_CONTROL_PLANE_PRIORITY_CLASS: &str =
    "hypershift.openshift.io/control-plane-priority-class";
pub const ANNOTATION_ETCD_PRIORITY_CLASS: &str = "hypershift.openshift.io/etcd-priority-class";
pub const ANNOTATION_API_CRITICAL_PRIORITY_CLASS: &str =
    "hypershift.openshift.io/api-critical-priority-class";
pub const ANNOTATION_MAX_REQUESTS_IN_FLIGHT: &str = "hypershift.openshift.io/max-requests-in-flight";
pub const ANNOTATION_MAX_MUTATING_REQUESTS_IN_FLIGHT: &str =
    "hypershift.openshift.io/max-mutating-requests-in-flight";
pub const ANNOTATION_MHC_TIMEOUT: &str = "hypershift.openshift.io/mhc-timeout";
pub const ANNOTATION_RESOURCE_REQUEST_OVERRIDE_PREFIX: &str =
    "hypershift.openshift.io/resource-request-override/";

/// Default namespace for generic, size-keyed Placeholder Deployments (§6).
pub const NAMESPACE_PLACEHOLDERS: &str = "hypershift-placeholders";

/// Default namespace for GC-named holding deployments (§6).
pub const NAMESPACE_HOLDING_DEPLOYMENTS: &str = "hypershift-request-serving-autosizing-placeholder";

/// Name of the singleton `SchedulingConfiguration` object (§6).
pub const SCHEDULING_CONFIGURATION_NAME: &str = "cluster";

/// `<namespace>-<name>` key used throughout as the GC's stable identity.
pub fn guest_cluster_key(namespace: &str, name: &str) -> String {
    format!("{namespace}-{name}")
}

/// Name a generic placeholder deployment for `(size, index)`.
pub fn placeholder_deployment_name(size: &str, index: u32) -> String {
    format!("placeholder-{size}-{index}")
}

/// Name a GC holding deployment: `<namespace>-<name>`.
pub fn holding_deployment_name(namespace: &str, name: &str) -> String {
    guest_cluster_key(namespace, name)
}
