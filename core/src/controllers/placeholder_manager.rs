//! Placeholder Manager (§4.B): keeps N generic placeholder deployments per
//! size class warm, retargeted away from taken pair groups.
//!
//! Reconciles on the singleton `SchedulingConfiguration` -- it is the one
//! object whose change ("placeholders count for size X changed") should
//! retrigger this component, and its `sizes[]` is the authoritative list of
//! what to maintain.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::{
    controller::{Action, Config},
    watcher, Controller,
};
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use models::{constants::placeholder_deployment_name, SchedulingConfiguration, LABEL_PLACEHOLDER};

use super::{node_view, parse_placeholder_name, taken_pair_groups, Context};
use crate::error::{map_action, Error, Result};
use crate::logic::placeholder_spec::{deployment, PlaceholderSpec};

const CONTROLLER_NAME: &str = "placeholder_manager";

pub async fn run(ctx: Arc<Context>) {
    let configs: Api<SchedulingConfiguration> = Api::all(ctx.client.clone());
    let concurrency = ctx.config.concurrency as usize;
    Controller::new(configs, watcher::Config::default())
        .with_config(Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            if let Err(err) = result {
                warn!(error = %err, "placeholder manager reconcile failed");
            }
        })
        .await;
}

#[instrument(skip(ctx, config), fields(name = %config.name_any()))]
async fn reconcile(config: Arc<SchedulingConfiguration>, ctx: Arc<Context>) -> Result<Action> {
    let started = std::time::Instant::now();
    let outcome = reconcile_inner(&config, &ctx).await;
    ctx.metrics.record_reconcile(CONTROLLER_NAME, started.elapsed().as_secs_f64());
    if let Err(err) = &outcome {
        ctx.metrics.record_error(CONTROLLER_NAME, err.bucket());
    }
    outcome
}

async fn reconcile_inner(config: &SchedulingConfiguration, ctx: &Context) -> Result<Action> {
    if !config.spec.valid {
        return Ok(Action::await_change());
    }

    let nodes: Api<Node> = Api::all(ctx.client.clone());
    let node_views: Vec<_> = nodes.list(&ListParams::default()).await.map_err(Error::Store)?.items.iter().map(node_view).collect();
    let taken = taken_pair_groups(&node_views, &[]);

    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), &ctx.config.placeholder_namespace);
    let existing = deployments.list(&ListParams::default().labels(LABEL_PLACEHOLDER)).await.map_err(Error::Store)?;

    let mut by_size: BTreeMap<String, BTreeMap<u32, &Deployment>> = BTreeMap::new();
    for dep in &existing.items {
        let name = dep.name_any();
        if let Some((size, index)) = parse_placeholder_name(&name) {
            by_size.entry(size.to_string()).or_default().insert(index, dep);
        }
    }

    let mut errors = Vec::new();
    let mut total_desired: i64 = 0;
    for size in &config.spec.sizes {
        let desired = size.management.placeholders;
        total_desired += desired as i64;
        let present: BTreeMap<u32, &Deployment> = by_size.get(&size.name).cloned().unwrap_or_default();

        for (&index, dep) in present.iter() {
            if index >= desired {
                info!(size = %size.name, index, "deleting surplus placeholder deployment");
                if let Err(e) = deployments.delete(&dep.name_any(), &DeleteParams::default()).await {
                    if !matches!(&e, kube::Error::Api(api) if api.code == 404) {
                        errors.push(Error::Store(e));
                    }
                }
            }
        }

        for index in 0..desired {
            let name = placeholder_deployment_name(&size.name, index);
            let spec = PlaceholderSpec {
                name: name.clone(),
                namespace: ctx.config.placeholder_namespace.clone(),
                size: size.name.clone(),
                replicas: 2,
                required_pair_group: None,
                excluded_pair_groups: taken.clone(),
            };
            let desired_dep = deployment(&spec);

            match present.get(&index) {
                None => {
                    info!(size = %size.name, index, "creating placeholder deployment");
                    if let Err(e) = deployments.create(&PostParams::default(), &desired_dep).await {
                        if !matches!(&e, kube::Error::Api(api) if api.code == 409) {
                            errors.push(Error::Store(e));
                        }
                    }
                }
                Some(existing_dep) => {
                    if excluded_pair_groups_changed(existing_dep, &taken) {
                        debug!(size = %size.name, index, "retargeting placeholder deployment away from taken pair groups");
                        if let Err(e) =
                            deployments.patch(&name, &PatchParams::apply(CONTROLLER_NAME), &Patch::Apply(&desired_dep)).await
                        {
                            errors.push(Error::Store(e));
                        }
                    }
                }
            }
        }
    }

    if let Some(err) = Error::aggregate(errors) {
        return Err(err);
    }
    ctx.metrics.set_placeholder_deployments(total_desired);
    Ok(Action::requeue(ctx.config.resync_interval()))
}

fn excluded_pair_groups_changed(existing: &Deployment, taken: &[String]) -> bool {
    let current: Vec<String> = existing
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| p.affinity.as_ref())
        .and_then(|a| a.node_affinity.as_ref())
        .and_then(|n| n.required_during_scheduling_ignored_during_execution.as_ref())
        .and_then(|sel| sel.node_selector_terms.first())
        .and_then(|term| term.match_expressions.as_ref())
        .and_then(|exprs| exprs.iter().find(|e| e.key == models::LABEL_PAIR_GROUP && e.operator == "NotIn"))
        .and_then(|e| e.values.clone())
        .unwrap_or_default();
    let mut current_sorted = current;
    current_sorted.sort();
    let mut taken_sorted = taken.to_vec();
    taken_sorted.sort();
    current_sorted != taken_sorted
}

fn error_policy(config: Arc<SchedulingConfiguration>, err: &Error, ctx: Arc<Context>) -> Action {
    warn!(config = %config.name_any(), error = %err, "placeholder manager error");
    ctx.metrics.record_error(CONTROLLER_NAME, err.bucket());
    map_action(err)
}
