//! Machine-Group Down-Scaler (§4.E): scales MachineGroups to 0 once their
//! nodes are no longer needed, honoring Policy-GC's age gate and
//! Policy-OrphanNode's whole-pair-group sweep.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::{Action, Config};
use kube::runtime::{watcher, Controller};
use kube::ResourceExt;
use serde_json::json;
use tracing::{info, instrument, warn};

use models::{
    GuestCluster, Machine, MachineGroup, LABEL_HOSTED_CLUSTER_NAME, LABEL_HOSTED_CLUSTER_NAMESPACE,
    LABEL_REQUEST_SERVING_COMPONENT,
};

use super::{node_view, Context};
use crate::error::{map_action, Error, Result};
use crate::logic::downscale_calc::{active_nodes_for_gc, inactive_nodes_in_pair_group, orphan_node_targets, plan_scale_down};
use crate::logic::NodeView;

const CONTROLLER_NAME: &str = "downscaler";

pub async fn run(ctx: Arc<Context>) {
    let nodes: Api<Node> = Api::all(ctx.client.clone());
    let watcher_config = watcher::Config::default().labels(&format!("{LABEL_REQUEST_SERVING_COMPONENT}=true"));
    let concurrency = ctx.config.concurrency as usize;

    Controller::new(nodes, watcher_config)
        .with_config(Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            if let Err(err) = result {
                warn!(error = %err, "down-scaler reconcile failed");
            }
        })
        .await;
}

#[instrument(skip(ctx, node), fields(name = %node.name_any()))]
async fn reconcile(node: Arc<Node>, ctx: Arc<Context>) -> Result<Action> {
    let started = std::time::Instant::now();
    let outcome = reconcile_inner(&node, &ctx).await;
    ctx.metrics.record_reconcile(CONTROLLER_NAME, started.elapsed().as_secs_f64());
    if let Err(err) = &outcome {
        ctx.metrics.record_error(CONTROLLER_NAME, err.bucket());
    }
    outcome
}

async fn reconcile_inner(node: &Node, ctx: &Context) -> Result<Action> {
    let this = node_view(node);
    let Some(gc_key) = &this.hosted_cluster else {
        return Ok(Action::await_change());
    };

    let nodes_api: Api<Node> = Api::all(ctx.client.clone());
    let all_nodes: Vec<NodeView> =
        nodes_api.list(&ListParams::default()).await.map_err(Error::Store)?.items.iter().map(node_view).collect();

    let labels = node.metadata.labels.clone().unwrap_or_default();
    let namespace = labels.get(LABEL_HOSTED_CLUSTER_NAMESPACE);
    let name = labels.get(LABEL_HOSTED_CLUSTER_NAME);

    let targets: Vec<NodeView> = match (namespace, name) {
        (Some(ns), Some(n)) => {
            let gcs: Api<GuestCluster> = Api::namespaced(ctx.client.clone(), ns);
            match gcs.get(n).await {
                Ok(gc) => {
                    let desired_size = gc.spec.size_class.clone().unwrap_or_default();
                    let active = active_nodes_for_gc(gc_key, &desired_size, &all_nodes);
                    match &this.pair_group {
                        Some(pg) => inactive_nodes_in_pair_group(pg, &active, &all_nodes).into_iter().cloned().collect(),
                        None => Vec::new(),
                    }
                }
                Err(kube::Error::Api(e)) if e.code == 404 => {
                    orphan_node_targets(&this, &all_nodes).into_iter().cloned().collect()
                }
                Err(e) => return Err(Error::Store(e)),
            }
        }
        _ => Vec::new(),
    };

    if targets.is_empty() {
        return Ok(Action::await_change());
    }

    let refs: Vec<&NodeView> = targets.iter().collect();
    let plan = plan_scale_down(&refs, Utc::now(), ctx.config.node_scale_down_delay());

    let mut errors = Vec::new();
    for node_name in &plan.ready {
        if let Err(e) = scale_down_owning_group(ctx, node_name).await {
            errors.push(e);
        }
    }
    if let Some(err) = Error::aggregate(errors) {
        return Err(err);
    }

    if let Some(delay) = plan.requeue_after {
        return Ok(Action::requeue(delay));
    }
    Ok(Action::await_change())
}

/// Resolves `node_name` back to its owning MachineGroup via the Machine
/// back-reference (§4.E: "resolve its MG via the machine back-reference
/// annotation") and scales it to 0 if still running.
async fn scale_down_owning_group(ctx: &Context, node_name: &str) -> Result<()> {
    let machines: Api<Machine> = Api::all(ctx.client.clone());
    let list = machines.list(&ListParams::default()).await.map_err(Error::Store)?;
    let Some(machine) = list.items.into_iter().find(|m| m.spec.node_ref.as_deref() == Some(node_name)) else {
        return Ok(());
    };

    let mg_namespace = machine.namespace().unwrap_or_default();
    let mg_name = machine.spec.machine_group;
    let mgs: Api<MachineGroup> = Api::namespaced(ctx.client.clone(), &mg_namespace);
    match mgs.get(&mg_name).await {
        Ok(mg) if mg.spec.replicas > 0 => {
            info!(node = %node_name, machine_group = %mg_name, "scaling down machine group");
            let patch = json!({ "spec": { "replicas": 0 } });
            mgs.patch(&mg_name, &PatchParams::apply(CONTROLLER_NAME), &Patch::Merge(&patch)).await.map_err(Error::Store)?;
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(Error::Store(e)),
    }
}

fn error_policy(node: Arc<Node>, err: &Error, ctx: Arc<Context>) -> Action {
    warn!(node = %node.name_any(), error = %err, "down-scaler error");
    ctx.metrics.record_error(CONTROLLER_NAME, err.bucket());
    map_action(err)
}
