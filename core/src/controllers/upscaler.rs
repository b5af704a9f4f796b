//! Machine-Group Up-Scaler (§4.D): scales MachineGroups to 1 replica to
//! cover unscheduled placeholder/holding-deployment Pods.
//!
//! Reconciles on unscheduled Pods carrying the placeholder label; every
//! reconcile re-derives requirements from the full live Pod/Node/MachineGroup
//! snapshot rather than trusting the triggering Pod alone, since a single
//! scale-up decision depends on the whole pending set.

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::{Action, Config};
use kube::runtime::{watcher, Controller};
use kube::ResourceExt;
use serde_json::json;
use tracing::{info, instrument, warn};

use models::{MachineGroup, LABEL_PLACEHOLDER};

use super::{is_unscheduled, machine_group_view, node_view, pending_pod_view, taken_pair_groups, Context};
use crate::error::{map_action, Error, Result};
use crate::logic::upscale_calc::{compute_requirements, open_pair_scale_up, targeted_scale_up};

const CONTROLLER_NAME: &str = "upscaler";

pub async fn run(ctx: Arc<Context>) {
    let pods: Api<Pod> = Api::all(ctx.client.clone());
    let watcher_config = watcher::Config::default().labels(LABEL_PLACEHOLDER);
    let concurrency = ctx.config.concurrency as usize;

    Controller::new(pods, watcher_config)
        .with_config(Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            if let Err(err) = result {
                warn!(error = %err, "up-scaler reconcile failed");
            }
        })
        .await;
}

#[instrument(skip(ctx, pod), fields(name = %pod.name_any()))]
async fn reconcile(pod: Arc<Pod>, ctx: Arc<Context>) -> Result<Action> {
    let started = std::time::Instant::now();
    let outcome = reconcile_inner(&pod, &ctx).await;
    ctx.metrics.record_reconcile(CONTROLLER_NAME, started.elapsed().as_secs_f64());
    if let Err(err) = &outcome {
        ctx.metrics.record_error(CONTROLLER_NAME, err.bucket());
    }
    outcome
}

async fn reconcile_inner(pod: &Pod, ctx: &Context) -> Result<Action> {
    if !is_unscheduled(pod) {
        return Ok(Action::await_change());
    }

    let pods_api: Api<Pod> = Api::all(ctx.client.clone());
    let all_pods = pods_api.list(&ListParams::default().labels(LABEL_PLACEHOLDER)).await.map_err(Error::Store)?;
    let pending: Vec<_> = all_pods.items.iter().filter(|p| is_unscheduled(p)).filter_map(pending_pod_view).collect();
    if pending.is_empty() {
        return Ok(Action::await_change());
    }

    let nodes: Api<Node> = Api::all(ctx.client.clone());
    let node_views: Vec<_> = nodes.list(&ListParams::default()).await.map_err(Error::Store)?.items.iter().map(node_view).collect();
    let free_nodes: Vec<_> = node_views.iter().filter(|n| n.is_free()).cloned().collect();
    let taken = taken_pair_groups(&node_views, &pending);

    let mgs: Api<MachineGroup> = Api::all(ctx.client.clone());
    let mg_list = mgs.list(&ListParams::default()).await.map_err(Error::Store)?;
    let mg_views: Vec<_> = mg_list.items.iter().map(machine_group_view).collect();

    let requirements = compute_requirements(&pending);
    let mut to_scale = std::collections::BTreeSet::new();
    for req in &requirements {
        let names = if req.pair_group.is_some() {
            targeted_scale_up(req, &mg_views)
        } else {
            open_pair_scale_up(req, &mg_views, &free_nodes, &taken)
        };
        to_scale.extend(names);
    }

    let mut errors = Vec::new();
    for name in &to_scale {
        let Some(mg) = mg_list.items.iter().find(|m| &m.name_any() == name) else { continue };
        let api: Api<MachineGroup> = Api::namespaced(ctx.client.clone(), &mg.namespace().unwrap_or_default());
        let patch = json!({ "spec": { "replicas": 1 } });
        info!(machine_group = %name, "scaling up to cover pending pair");
        if let Err(e) = api.patch(name, &PatchParams::apply(CONTROLLER_NAME), &Patch::Merge(&patch)).await {
            errors.push(Error::Store(e));
        }
    }

    if let Some(err) = Error::aggregate(errors) {
        return Err(err);
    }
    Ok(Action::await_change())
}

fn error_policy(pod: Arc<Pod>, err: &Error, ctx: Arc<Context>) -> Action {
    warn!(pod = %pod.name_any(), error = %err, "up-scaler error");
    ctx.metrics.record_error(CONTROLLER_NAME, err.bucket());
    map_action(err)
}
