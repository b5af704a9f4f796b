//! Runtime configuration.
//!
//! CLI/config-file loading is out of scope (§1 non-goal) beyond this thin
//! flag set: namespaces, poll intervals and the node scale-down delay are
//! all this process needs to know on top of what it reads live from the
//! object store (the `SchedulingConfiguration` singleton is never read from
//! a file, see SPEC_FULL §10.4).

use std::time::Duration;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "rss-core", about = "Request-serving node scheduler, sizer and autoscaler")]
pub struct RuntimeConfig {
    /// Namespace holding the generic, size-keyed Placeholder Deployments.
    #[arg(long, env = "RSS_NAMESPACE_PLACEHOLDERS", default_value = models::NAMESPACE_PLACEHOLDERS)]
    pub placeholder_namespace: String,

    /// Namespace holding GC-named holding deployments.
    #[arg(long, env = "RSS_NAMESPACE_HOLDING", default_value = models::NAMESPACE_HOLDING_DEPLOYMENTS)]
    pub holding_namespace: String,

    /// Minimum age a bound node must reach before Down-Scaler will scale
    /// down its backing MachineGroup (§4.E `nodeScaleDownDelay`).
    #[arg(long, env = "RSS_NODE_SCALE_DOWN_DELAY_SECS", default_value_t = 300)]
    pub node_scale_down_delay_secs: u64,

    /// Per-controller requeue concurrency (§5: "up to 10 keys per loop
    /// process in parallel").
    #[arg(long, env = "RSS_CONCURRENCY", default_value_t = 10)]
    pub concurrency: u16,

    /// How often Up-Scaler, Down-Scaler and the Non-Serving Group Sizer
    /// re-scan even absent a triggering watch event, as a safety net.
    #[arg(long, env = "RSS_RESYNC_SECS", default_value_t = 60)]
    pub resync_secs: u64,

    /// Lease used to ensure only one replica drives mutations at a time
    /// (SPEC_FULL §10.5).
    #[arg(long, env = "RSS_LEASE_NAME", default_value = "rss-core-leader")]
    pub lease_name: String,

    #[arg(long, env = "RSS_LEASE_NAMESPACE", default_value = "hypershift")]
    pub lease_namespace: String,

    #[arg(long, env = "RSS_LEASE_TTL_SECS", default_value_t = 15)]
    pub lease_ttl_secs: u64,

    #[arg(long, env = "RSS_LEASE_RENEW_SECS", default_value_t = 5)]
    pub lease_renew_secs: u64,

    /// Address the Prometheus metrics endpoint binds to.
    #[arg(long, env = "RSS_METRICS_ADDR", default_value = "0.0.0.0:9090")]
    pub metrics_addr: String,

    /// Emit JSON-formatted logs instead of human-readable ones.
    #[arg(long, env = "RSS_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl RuntimeConfig {
    pub fn node_scale_down_delay(&self) -> Duration {
        Duration::from_secs(self.node_scale_down_delay_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn lease_renew_interval(&self) -> Duration {
        Duration::from_secs(self.lease_renew_secs)
    }
}
