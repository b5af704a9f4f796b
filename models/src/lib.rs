//! Shared object-store types for the request-serving fleet orchestrator.
//!
//! These are the custom resources the core's controllers watch and patch,
//! plus the label/annotation/taint vocabulary that ties them together. Node,
//! Pod and Deployment are native Kubernetes types (`k8s_openapi`) and are not
//! redefined here.

pub mod constants;
pub mod guest_cluster;
pub mod machine;
pub mod machine_group;
pub mod scheduling_configuration;

pub use constants::*;
pub use guest_cluster::{GuestCluster, GuestClusterSpec, GuestClusterStatus, TopologyMode};
pub use machine::{Machine, MachineSpec};
pub use machine_group::{MachineGroup, MachineGroupSpec, MachineGroupStatus, MachineGroupTemplate};
pub use scheduling_configuration::{
    EffectsSpec, ManagementSpec, ResourceRequestOverride, SchedulingConfiguration,
    SchedulingConfigurationSpec, SizeClassCriteria, SizeClassSpec,
};
