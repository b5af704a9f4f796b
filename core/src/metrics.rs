//! Prometheus metrics (SPEC_FULL §10.9): reconcile counts/durations per
//! controller, plus two fleet gauges operators actually page on.

use prometheus::{HistogramVec, IntCounterVec, IntGauge, Registry};

pub struct Metrics {
    registry: Registry,
    reconciles_total: IntCounterVec,
    reconcile_errors_total: IntCounterVec,
    reconcile_duration_seconds: HistogramVec,
    bound_pairs: IntGauge,
    placeholder_deployments: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let reconciles_total = IntCounterVec::new(
            prometheus::Opts::new("rss_reconciles_total", "Total reconcile invocations by controller"),
            &["controller"],
        )
        .expect("metric options are static and valid");
        let reconcile_errors_total = IntCounterVec::new(
            prometheus::Opts::new("rss_reconcile_errors_total", "Total reconcile failures by controller and bucket"),
            &["controller", "bucket"],
        )
        .expect("metric options are static and valid");
        let reconcile_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("rss_reconcile_duration_seconds", "Reconcile latency by controller"),
            &["controller"],
        )
        .expect("metric options are static and valid");
        let bound_pairs = IntGauge::new("rss_bound_pairs", "Guest clusters with a fully bound node pair")
            .expect("metric options are static and valid");
        let placeholder_deployments =
            IntGauge::new("rss_placeholder_deployments", "Generic placeholder deployments currently present")
                .expect("metric options are static and valid");

        registry.register(Box::new(reconciles_total.clone())).expect("unique metric name");
        registry.register(Box::new(reconcile_errors_total.clone())).expect("unique metric name");
        registry.register(Box::new(reconcile_duration_seconds.clone())).expect("unique metric name");
        registry.register(Box::new(bound_pairs.clone())).expect("unique metric name");
        registry.register(Box::new(placeholder_deployments.clone())).expect("unique metric name");

        Self { registry, reconciles_total, reconcile_errors_total, reconcile_duration_seconds, bound_pairs, placeholder_deployments }
    }

    pub fn record_reconcile(&self, controller: &str, duration_secs: f64) {
        self.reconciles_total.with_label_values(&[controller]).inc();
        self.reconcile_duration_seconds.with_label_values(&[controller]).observe(duration_secs);
    }

    pub fn record_error(&self, controller: &str, bucket: crate::error::ErrorBucket) {
        let label = match bucket {
            crate::error::ErrorBucket::Transient => "transient",
            crate::error::ErrorBucket::PreconditionNotMet => "precondition_not_met",
            crate::error::ErrorBucket::Configuration => "configuration",
            crate::error::ErrorBucket::PermanentInvalid => "permanent_invalid",
            crate::error::ErrorBucket::FatalSetup => "fatal_setup",
        };
        self.reconcile_errors_total.with_label_values(&[controller, label]).inc();
    }

    pub fn set_bound_pairs(&self, count: i64) {
        self.bound_pairs.set(count);
    }

    pub fn set_placeholder_deployments(&self, count: i64) {
        self.placeholder_deployments.set(count);
    }

    /// Text-exposition-format snapshot served at `/metrics`.
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).expect("encoding to an in-memory buffer cannot fail");
        String::from_utf8(buffer).expect("prometheus text encoding is always valid UTF-8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
