//! Non-Serving Group Sizer (§4.F): keeps the non-request-serving
//! MachineGroup trio scaled to cover GC headroom plus a configured buffer.
//!
//! Reconciles on the singleton `SchedulingConfiguration`, same rationale as
//! `placeholder_manager`: it is the one object whose change should retrigger
//! this component, with a resync interval as a safety net against GC/MG
//! count drift between config changes.

use std::sync::Arc;

use futures::StreamExt;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::{Action, Config};
use kube::runtime::{watcher, Controller};
use kube::ResourceExt;
use serde_json::json;
use tracing::{instrument, warn};

use models::{GuestCluster, MachineGroup, SchedulingConfiguration};

use super::{machine_group_view, record_error_event, Context};
use crate::error::{map_action, Error, Result};
use crate::logic::nonserving_calc::{self, GcSizeView};

const CONTROLLER_NAME: &str = "nonserving_sizer";

pub async fn run(ctx: Arc<Context>) {
    let configs: Api<SchedulingConfiguration> = Api::all(ctx.client.clone());
    let concurrency = ctx.config.concurrency as usize;
    Controller::new(configs, watcher::Config::default())
        .with_config(Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            if let Err(err) = result {
                warn!(error = %err, "non-serving sizer reconcile failed");
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
    let mgs: Api<MachineGroup> = Api::all(ctx.client.clone());
    let mg_list = mgs.list(&ListParams::default()).await.map_err(Error::Store)?;
    let non_serving: Vec<&MachineGroup> = mg_list.items.iter().filter(|mg| mg.is_non_request_serving()).collect();
    let mg_views: Vec<_> = non_serving.iter().map(|mg| machine_group_view(mg)).collect();

    if let Err(reason) = nonserving_calc::validate(&config.spec, &mg_views) {
        warn!(reason, "non-serving sizer preconditions not met");
        return Ok(Action::await_change());
    }

    let gcs: Api<GuestCluster> = Api::all(ctx.client.clone());
    let gc_list = gcs.list(&ListParams::default()).await.map_err(Error::Store)?;
    let gc_views: Vec<_> = gc_list.items.iter().map(|gc| GcSizeView { size_class: gc.spec.size_class.clone() }).collect();

    let counts = nonserving_calc::count_gcs_by_size(&gc_views, &config.spec);
    let needed = nonserving_calc::needed_replicas(&config.spec, &counts);
    let (min, max) = (mg_views[0].min_size, mg_views[0].max_size);
    let desired = nonserving_calc::clamp(needed, min, max);

    let to_patch = nonserving_calc::mismatched(&mg_views, desired);
    let mut errors = Vec::new();
    for name in &to_patch {
        let Some(mg) = non_serving.iter().find(|m| &m.name_any() == name) else { continue };
        let api: Api<MachineGroup> = Api::namespaced(ctx.client.clone(), &mg.namespace().unwrap_or_default());
        let patch = json!({ "spec": { "replicas": desired } });
        if let Err(e) = api.patch(name, &PatchParams::apply(CONTROLLER_NAME), &Patch::Merge(&patch)).await {
            errors.push(Error::Store(e));
        }
    }

    if let Some(err) = Error::aggregate(errors) {
        return Err(err);
    }
    Ok(Action::requeue(ctx.config.resync_interval()))
}

fn error_policy(config: Arc<SchedulingConfiguration>, err: &Error, ctx: Arc<Context>) -> Action {
    warn!(config = %config.name_any(), error = %err, "non-serving sizer error");
    ctx.metrics.record_error(CONTROLLER_NAME, err.bucket());
    map_action(err)
}
