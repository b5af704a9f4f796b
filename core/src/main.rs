//! Entrypoint: configuration, tracing, the Kubernetes client, leader
//! election and the Prometheus endpoint, then all six reconcile loops.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rss_core::cache::InstanceTypeCache;
use rss_core::config::RuntimeConfig;
use rss_core::controllers::{self, Context};
use rss_core::metrics::Metrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(RuntimeConfig::parse());
    init_tracing(config.log_json);

    let client = Client::try_default().await?;
    let metrics = Arc::new(Metrics::new());
    let cache = InstanceTypeCache::new();
    let ctx = Arc::new(Context { client: client.clone(), config: config.clone(), cache, metrics: metrics.clone() });

    let shutdown = CancellationToken::new();
    spawn_shutdown_signal(shutdown.clone());
    spawn_metrics_server(config.metrics_addr.clone(), metrics.clone(), shutdown.clone());

    run_with_leader_election(client, config, ctx, shutdown).await;
    Ok(())
}

/// Only the Lease holder drives mutations (SPEC_FULL §10.5); every replica
/// still serves `/metrics` and `/healthz` so liveness probes pass regardless
/// of leadership.
async fn run_with_leader_election(client: Client, config: Arc<RuntimeConfig>, ctx: Arc<Context>, shutdown: CancellationToken) {
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("rss-core-{}", uuid::Uuid::new_v4()));

    let leadership = LeaseLock::new(
        client,
        &config.lease_namespace,
        LeaseLockParams { holder_id, lease_name: config.lease_name.clone(), lease_ttl: config.lease_ttl() },
    );

    let mut controllers_task: Option<JoinHandle<()>> = None;
    let mut tick = interval(config.lease_renew_interval());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some(task) = controllers_task.take() {
                    task.abort();
                    let _ = task.await;
                }
                break;
            }
            _ = tick.tick() => {}
        }

        let lease = match leadership.try_acquire_or_renew().await {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "leader election renew/acquire failed");
                if let Some(task) = controllers_task.take() {
                    task.abort();
                }
                continue;
            }
        };

        if matches!(lease, LeaseLockResult::Acquired(_)) {
            if controllers_task.is_none() {
                info!("acquired leadership, starting reconcile loops");
                controllers_task = Some(tokio::spawn(run_controllers(ctx.clone())));
            }
        } else if let Some(task) = controllers_task.take() {
            warn!("lost leadership, stopping reconcile loops");
            task.abort();
        }
    }
}

async fn run_controllers(ctx: Arc<Context>) {
    tokio::join!(
        controllers::node_reaper::run(ctx.clone()),
        controllers::placeholder_manager::run(ctx.clone()),
        controllers::scheduler_sizer::run(ctx.clone()),
        controllers::upscaler::run(ctx.clone()),
        controllers::downscaler::run(ctx.clone()),
        controllers::nonserving_sizer::run(ctx),
    );
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn spawn_shutdown_signal(token: CancellationToken) {
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        token.cancel();
    });
}

fn spawn_metrics_server(addr: String, metrics: Arc<Metrics>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let socket_addr: SocketAddr = match addr.parse() {
            Ok(a) => a,
            Err(e) => {
                error!(error = %e, addr = %addr, "invalid metrics address");
                return;
            }
        };

        let make_svc = make_service_fn(move |_conn| {
            let metrics = metrics.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |req: Request<Body>| {
                    let metrics = metrics.clone();
                    async move { Ok::<_, hyper::Error>(serve(req, metrics)) }
                }))
            }
        });

        let server = Server::bind(&socket_addr).serve(make_svc);
        info!(addr = %socket_addr, "metrics server listening");
        if let Err(e) = server.with_graceful_shutdown(shutdown.cancelled_owned()).await {
            error!(error = %e, "metrics server failed");
        }
    });
}

fn serve(req: Request<Body>, metrics: Arc<Metrics>) -> Response<Body> {
    match req.uri().path() {
        "/metrics" => Response::new(Body::from(metrics.gather())),
        "/healthz" => Response::new(Body::from("ok")),
        _ => {
            let mut response = Response::new(Body::from("not found"));
            *response.status_mut() = StatusCode::NOT_FOUND;
            response
        }
    }
}
