//! Node Reaper (§4.A): deletes request-serving Nodes whose owning Guest
//! Cluster no longer exists.

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, DeleteParams};
use kube::runtime::{
    controller::{Action, Config},
    watcher, Controller,
};
use kube::ResourceExt;
use tracing::{info, instrument, warn};

use models::{GuestCluster, LABEL_HOSTED_CLUSTER, LABEL_HOSTED_CLUSTER_NAME, LABEL_HOSTED_CLUSTER_NAMESPACE, LABEL_REQUEST_SERVING_COMPONENT};

use super::Context;
use crate::error::{map_action, Error, Result};

const CONTROLLER_NAME: &str = "node_reaper";

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
                warn!(error = %err, "node reaper reconcile failed");
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
    let labels = node.metadata.labels.clone().unwrap_or_default();

    let (Some(namespace), Some(name)) =
        (labels.get(LABEL_HOSTED_CLUSTER_NAMESPACE), labels.get(LABEL_HOSTED_CLUSTER_NAME))
    else {
        return Ok(Action::await_change());
    };
    if !labels.contains_key(LABEL_HOSTED_CLUSTER) {
        return Ok(Action::await_change());
    }

    let gcs: Api<GuestCluster> = Api::namespaced(ctx.client.clone(), namespace);
    match gcs.get(name).await {
        Ok(_) => Ok(Action::await_change()),
        Err(kube::Error::Api(e)) if e.code == 404 => {
            let node_name = node.name_any();
            info!(node = %node_name, gc_namespace = %namespace, gc_name = %name, "owning guest cluster gone, deleting node");
            let api: Api<Node> = Api::all(ctx.client.clone());
            match api.delete(&node_name, &DeleteParams::default()).await {
                Ok(_) => Ok(Action::await_change()),
                Err(kube::Error::Api(e)) if e.code == 404 => Ok(Action::await_change()),
                Err(e) => Err(Error::Store(e)),
            }
        }
        Err(e) => Err(Error::Store(e)),
    }
}

fn error_policy(node: Arc<Node>, err: &Error, ctx: Arc<Context>) -> Action {
    warn!(node = %node.name_any(), error = %err, "node reaper error");
    ctx.metrics.record_error(CONTROLLER_NAME, err.bucket());
    map_action(err)
}
