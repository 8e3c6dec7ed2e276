use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and describe the filter series.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        describe_series();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe_series() {
    describe_counter!("analyze_requests_total", "Analyze requests received.");
    describe_counter!(
        "analyze_cache_hits_total",
        "Analyze requests answered from the audit log."
    );
    describe_counter!(
        "analyze_rate_limited_total",
        "Analyze requests rejected by the per-minute limit."
    );
    describe_counter!(
        "analyze_transport_errors_total",
        "Classification calls that failed in transport."
    );
    describe_counter!(
        "audit_evictions_total",
        "Audit entries dropped by the capacity policy."
    );
    describe_gauge!("audit_entries", "Entries currently held in the audit log.");
}
