//! Scheduler-Sizer (§4.C): for each Guest Cluster, selects or allocates a
//! pair of request-serving Nodes of the correct size and annotates the
//! cluster with scheduling effects.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::runtime::controller::{Action, Config};
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::runtime::{watcher, Controller};
use kube::ResourceExt;
use tracing::{info, instrument, warn};

use models::{
    GuestCluster, SchedulingConfiguration, TopologyMode, ANNOTATION_API_CRITICAL_PRIORITY_CLASS,
    ANNOTATION_CONTROL_PLANE_PRIORITY_CLASS, ANNOTATION_ETCD_PRIORITY_CLASS, ANNOTATION_GO_MEMORY_LIMIT,
    ANNOTATION_LOAD_BALANCER_SUBNETS, ANNOTATION_MAX_MUTATING_REQUESTS_IN_FLIGHT, ANNOTATION_MAX_REQUESTS_IN_FLIGHT,
    ANNOTATION_MHC_TIMEOUT, ANNOTATION_NODE_ADDITIONAL_SELECTOR, ANNOTATION_RESOURCE_REQUEST_OVERRIDE_PREFIX,
    ANNOTATION_SCHEDULED, LABEL_HOSTED_CLUSTER, LABEL_HOSTED_CLUSTER_NAME, LABEL_HOSTED_CLUSTER_NAMESPACE,
    LABEL_NODE_SIZE, LABEL_PLACEHOLDER, SCHEDULING_CONFIGURATION_NAME, TAINT_HOSTED_CLUSTER,
};

use super::{is_deployment_ready, node_view, parse_placeholder_name, record_error_event, taken_pair_groups, Context};
use crate::cache::InstanceTypeKey;
use crate::error::{map_action, Error, Result};
use crate::logic::pairs::{self, PairState};
use crate::logic::placeholder_spec::{deployment, PlaceholderSpec};
use crate::logic::taken::taken_from_nodes;
use crate::logic::NodeView;

const CONTROLLER_NAME: &str = "scheduler_sizer";
const FINALIZER_NAME: &str = "hypershift.openshift.io/scheduler-sizer";

pub async fn run(ctx: Arc<Context>) {
    let gcs: Api<GuestCluster> = Api::all(ctx.client.clone());
    let concurrency = ctx.config.concurrency as usize;
    Controller::new(gcs, watcher::Config::default())
        .with_config(Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            if let Err(err) = result {
                warn!(error = %err, "scheduler-sizer reconcile failed");
            }
        })
        .await;
}

#[instrument(skip(ctx, gc), fields(gc = %gc.name_any()))]
async fn reconcile(gc: Arc<GuestCluster>, ctx: Arc<Context>) -> Result<Action> {
    let started = std::time::Instant::now();
    let namespace = gc.namespace().unwrap_or_default();
    let api: Api<GuestCluster> = Api::namespaced(ctx.client.clone(), &namespace);
    let gc_for_event = gc.clone();

    let outcome = finalizer(&api, FINALIZER_NAME, gc, |event| async {
        match event {
            FinalizerEvent::Apply(gc) => apply(&gc, &ctx).await,
            FinalizerEvent::Cleanup(gc) => cleanup(&gc).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)));

    ctx.metrics.record_reconcile(CONTROLLER_NAME, started.elapsed().as_secs_f64());
    if let Err(err) = &outcome {
        ctx.metrics.record_error(CONTROLLER_NAME, err.bucket());
        record_error_event(&ctx.client, gc_for_event.as_ref(), err).await;
    }
    outcome
}

async fn cleanup(gc: &GuestCluster) -> Result<Action> {
    info!(gc = %gc.key(), "guest cluster removed, scheduler-sizer finalizer released");
    Ok(Action::await_change())
}

async fn apply(gc: &GuestCluster, ctx: &Context) -> Result<Action> {
    if gc.spec.topology_mode != TopologyMode::DedicatedRequestServing {
        return Ok(Action::await_change());
    }
    if let Some(paused_until) = gc.spec.paused_until {
        let now = Utc::now();
        if paused_until > now {
            let remaining = (paused_until - now).to_std().unwrap_or(Duration::ZERO);
            return Ok(Action::requeue(remaining));
        }
    }
    let Some(size_class) = gc.spec.size_class.clone() else {
        return Ok(Action::await_change());
    };

    let configs: Api<SchedulingConfiguration> = Api::all(ctx.client.clone());
    let config = match configs.get(SCHEDULING_CONFIGURATION_NAME).await {
        Ok(c) => c,
        Err(kube::Error::Api(e)) if e.code == 404 => return Ok(Action::await_change()),
        Err(e) => return Err(Error::Store(e)),
    };
    if !config.spec.valid {
        return Ok(Action::await_change());
    }
    // §9 Open Question resolved: a sizeClass absent from configuration is
    // ignored, not an error -- see DESIGN.md.
    if config.spec.size(&size_class).is_none() {
        return Ok(Action::await_change());
    }

    let gc_key = gc.key();
    let nodes: Api<Node> = Api::all(ctx.client.clone());
    let node_views: Vec<NodeView> =
        nodes.list(&ListParams::default()).await.map_err(Error::Store)?.items.iter().map(node_view).collect();
    let free: Vec<NodeView> = node_views.iter().filter(|n| n.is_free()).cloned().collect();
    let taken = taken_pair_groups(&node_views, &[]);

    match pairs::probe_pair(&gc_key, &node_views, &size_class) {
        PairState::Complete { pair_group } => {
            finalize_binding(gc, ctx, &gc_key, &size_class, &pair_group, &node_views, &config).await
        }
        PairState::Mismatched => {
            ensure_holding_deployment(ctx, &gc_key, &size_class, None, 2, &taken).await?;
            Ok(Action::await_change())
        }
        PairState::Partial { bound, pair_group } => {
            match pairs::completion_candidate(&free, &pair_group, &size_class, &bound.zone) {
                Some(candidate) => {
                    bind_node(ctx, &candidate.name, &gc_key, gc).await?;
                    Ok(Action::requeue(Duration::from_secs(1)))
                }
                None => {
                    ensure_holding_deployment(ctx, &gc_key, &size_class, Some(pair_group), 1, &taken).await?;
                    Ok(Action::await_change())
                }
            }
        }
        PairState::None => {
            let (ready_groups, owner) = ready_placeholder_candidates(ctx, &size_class, &free).await?;
            match pairs::adopt_from_placeholder(&free, &size_class, &ready_groups, &taken) {
                Some(pair_nodes) => {
                    for n in &pair_nodes {
                        bind_node(ctx, &n.name, &gc_key, gc).await?;
                    }
                    if let Some(pg) = pair_nodes.first().and_then(|n| n.pair_group.clone()) {
                        if let Some(dep_name) = owner.get(&pg) {
                            let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), &ctx.config.placeholder_namespace);
                            let _ = deployments.delete(dep_name, &DeleteParams::default()).await;
                        }
                    }
                    Ok(Action::requeue(Duration::from_secs(1)))
                }
                None => {
                    ensure_holding_deployment(ctx, &gc_key, &size_class, None, 2, &taken).await?;
                    Ok(Action::await_change())
                }
            }
        }
    }
}

/// §4.C step 5: patch labels + taint onto the chosen node. Idempotent --
/// a merge patch against the same values is a no-op on the store side.
async fn bind_node(ctx: &Context, node_name: &str, gc_key: &str, gc: &GuestCluster) -> Result<()> {
    let nodes: Api<Node> = Api::all(ctx.client.clone());
    let namespace = gc.namespace().unwrap_or_default();
    let name = gc.name_any();
    let patch = serde_json::json!({
        "metadata": {
            "labels": {
                LABEL_HOSTED_CLUSTER: gc_key,
                LABEL_HOSTED_CLUSTER_NAME: name,
                LABEL_HOSTED_CLUSTER_NAMESPACE: namespace,
            }
        },
        "spec": {
            "taints": [{ "key": TAINT_HOSTED_CLUSTER, "value": gc_key, "effect": "NoSchedule" }]
        }
    });
    nodes.patch(node_name, &PatchParams::apply(CONTROLLER_NAME), &Patch::Merge(&patch)).await.map_err(Error::Store)?;
    info!(node = %node_name, gc = %gc_key, "bound node to guest cluster");
    Ok(())
}

/// §4.C step 7: ensure the GC-named holding deployment exists with the
/// requested replica count and affinity constraints.
async fn ensure_holding_deployment(
    ctx: &Context,
    gc_key: &str,
    size_class: &str,
    required_pair_group: Option<String>,
    replicas: i32,
    taken: &[String],
) -> Result<()> {
    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), &ctx.config.holding_namespace);
    let spec = PlaceholderSpec {
        name: gc_key.to_string(),
        namespace: ctx.config.holding_namespace.clone(),
        size: size_class.to_string(),
        replicas,
        required_pair_group,
        excluded_pair_groups: taken.to_vec(),
    };
    let desired = deployment(&spec);
    match deployments.patch(gc_key, &PatchParams::apply(CONTROLLER_NAME), &Patch::Apply(&desired)).await {
        Ok(_) => Ok(()),
        Err(e) => Err(Error::Store(e)),
    }
}

/// §4.C step 4: ready generic PDs for `size_class`, mapped to the pair
/// group their pods currently occupy and the deployment name that should
/// be deleted once those nodes are adopted.
async fn ready_placeholder_candidates(
    ctx: &Context,
    size_class: &str,
    free: &[NodeView],
) -> Result<(Vec<String>, BTreeMap<String, String>)> {
    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), &ctx.config.placeholder_namespace);
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &ctx.config.placeholder_namespace);
    let list = deployments.list(&ListParams::default().labels(LABEL_PLACEHOLDER)).await.map_err(Error::Store)?;

    let mut groups = Vec::new();
    let mut owner = BTreeMap::new();
    for dep in list.items {
        let name = dep.name_any();
        let Some((size, _)) = parse_placeholder_name(&name) else { continue };
        if size != size_class || !is_deployment_ready(&dep) {
            continue;
        }
        let pod_list =
            pods.list(&ListParams::default().labels(&format!("{LABEL_PLACEHOLDER}={name}"))).await.map_err(Error::Store)?;
        let node_names: std::collections::BTreeSet<String> =
            pod_list.items.iter().filter_map(|p| p.spec.as_ref()?.node_name.clone()).collect();
        for n in free {
            if node_names.contains(&n.name) {
                if let Some(pg) = &n.pair_group {
                    groups.push(pg.clone());
                    owner.insert(pg.clone(), name.clone());
                }
            }
        }
    }
    groups.sort();
    groups.dedup();
    Ok((groups, owner))
}

/// §4.C step 6: write the scheduling-effects annotations and delete any
/// holding deployment still pinned to this GC.
async fn finalize_binding(
    gc: &GuestCluster,
    ctx: &Context,
    gc_key: &str,
    size_class: &str,
    _pair_group: &str,
    nodes: &[NodeView],
    config: &SchedulingConfiguration,
) -> Result<Action> {
    let bound: Vec<&NodeView> = nodes.iter().filter(|n| n.hosted_cluster.as_deref() == Some(gc_key)).collect();
    let size_spec = config
        .spec
        .size(size_class)
        .ok_or_else(|| Error::InvalidConfiguration(format!("size class {size_class} missing at final check")))?;

    let mut annotations: BTreeMap<String, String> = BTreeMap::new();
    annotations.insert(ANNOTATION_SCHEDULED.to_string(), "true".to_string());
    annotations.insert(ANNOTATION_NODE_ADDITIONAL_SELECTOR.to_string(), format!("{LABEL_NODE_SIZE}={size_class}"));

    let go_mem_limit = match bound.iter().find_map(|n| n.go_memory_limit.clone()) {
        Some(v) => Some(v),
        None => match size_spec.effects.go_mem_limit.clone() {
            Some(v) => Some(v),
            None => instance_type_go_mem_limit(ctx, &bound).await,
        },
    };
    if let Some(v) = go_mem_limit {
        annotations.insert(ANNOTATION_GO_MEMORY_LIMIT.to_string(), v);
    }
    if let Some(subnets) = bound.iter().find_map(|n| n.load_balancer_subnets.clone()) {
        annotations.insert(ANNOTATION_LOAD_BALANCER_SUBNETS.to_string(), subnets.replace('.', ","));
    }
    if let Some(v) = &size_spec.effects.control_plane_priority_class {
        annotations.insert(ANNOTATION_CONTROL_PLANE_PRIORITY_CLASS.to_string(), v.clone());
    }
    if let Some(v) = &size_spec.effects.etcd_priority_class {
        annotations.insert(ANNOTATION_ETCD_PRIORITY_CLASS.to_string(), v.clone());
    }
    if let Some(v) = &size_spec.effects.api_critical_priority_class {
        annotations.insert(ANNOTATION_API_CRITICAL_PRIORITY_CLASS.to_string(), v.clone());
    }
    if let Some(v) = size_spec.effects.max_requests_in_flight {
        annotations.insert(ANNOTATION_MAX_REQUESTS_IN_FLIGHT.to_string(), v.to_string());
    }
    if let Some(v) = size_spec.effects.max_mutating_requests_in_flight {
        annotations.insert(ANNOTATION_MAX_MUTATING_REQUESTS_IN_FLIGHT.to_string(), v.to_string());
    }
    if let Some(v) = &size_spec.effects.mhc_timeout {
        annotations.insert(ANNOTATION_MHC_TIMEOUT.to_string(), v.clone());
    }
    for r in &size_spec.effects.resource_requests {
        let key = format!("{ANNOTATION_RESOURCE_REQUEST_OVERRIDE_PREFIX}{}.{}", r.deployment, r.container);
        let mut parts = Vec::new();
        if let Some(mem) = &r.memory {
            parts.push(format!("memory={mem}"));
        }
        if let Some(cpu) = &r.cpu {
            parts.push(format!("cpu={cpu}"));
        }
        annotations.insert(key, parts.join(","));
    }

    // §8/P8 idempotence: a GC already carrying these exact annotations is
    // satisfied, so skip the write rather than merge-patching every reconcile.
    let current = gc.annotations();
    let unchanged = annotations.iter().all(|(k, v)| current.get(k) == Some(v));
    if !unchanged {
        let gcs: Api<GuestCluster> = Api::namespaced(ctx.client.clone(), &gc.namespace().unwrap_or_default());
        let patch = serde_json::json!({ "metadata": { "annotations": annotations } });
        gcs.patch(&gc.name_any(), &PatchParams::apply(CONTROLLER_NAME), &Patch::Merge(&patch)).await.map_err(Error::Store)?;
    }

    let holding: Api<Deployment> = Api::namespaced(ctx.client.clone(), &ctx.config.holding_namespace);
    if holding.get_opt(gc_key).await.map_err(Error::Store)?.is_some() {
        if let Err(e) = holding.delete(gc_key, &DeleteParams::default()).await {
            if !matches!(&e, kube::Error::Api(api) if api.code == 404) {
                return Err(Error::Store(e));
            }
        }
    }

    ctx.metrics.set_bound_pairs(taken_from_nodes(nodes).len() as i64);
    Ok(Action::await_change())
}

/// §10.6: when neither the node nor the size class's configured effects
/// carry a goMemoryLimit, consult the instance-type cache for the bound
/// node's machine shape. A cache miss (unlabeled node, unknown instance
/// type) just skips the annotation -- it has no other correctness effect.
async fn instance_type_go_mem_limit(ctx: &Context, bound: &[&NodeView]) -> Option<String> {
    let node = bound.first()?;
    let region = node.region.clone()?;
    let instance_type = node.instance_type.clone()?;
    let key = InstanceTypeKey { region, instance_type };
    let info = ctx.cache.get_or_fetch(key, |k| async move { crate::cache::lookup_instance_memory(&k.instance_type) }).await?;
    Some(format!("{}Mi", info.memory_mib * 3 / 4))
}

fn error_policy(gc: Arc<GuestCluster>, err: &Error, ctx: Arc<Context>) -> Action {
    warn!(gc = %gc.name_any(), error = %err, "scheduler-sizer error");
    ctx.metrics.record_error(CONTROLLER_NAME, err.bucket());
    map_action(err)
}
