//! Prometheus Metrics for the MPA operator
//!
//! Exports metrics for:
//! - Reconciliation outcomes and latency
//! - Scaling decisions by mode
//! - Optimistic-concurrency conflicts and status write failures

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, register_int_counter, CounterVec, Encoder,
    Histogram, IntCounter, TextEncoder,
};
use tracing::info;

/// Reconciliations by result (settled, awaiting_target, deleted, error)
pub static RECONCILIATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mpa_reconciliations_total",
        "Total reconciliation passes by result",
        &["result"]
    )
    .unwrap()
});

/// Decisions by scaling mode
pub static SCALE_DECISIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mpa_scale_decisions_total",
        "Scaling decisions by mode",
        &["mode"]
    )
    .unwrap()
});

/// Writes rejected because the object changed since it was read
pub static WRITE_CONFLICTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mpa_write_conflicts_total",
        "Optimistic concurrency conflicts by object",
        &["object"]
    )
    .unwrap()
});

pub static STATUS_WRITE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "mpa_status_write_failures_total",
        "Status writes that failed for reasons other than a conflict"
    )
    .unwrap()
});

pub static RECONCILE_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "mpa_reconcile_duration_seconds",
        "Duration of a reconciliation pass in seconds",
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap()
});

/// Force registration so every series shows up on the first scrape
pub fn init_metrics() {
    Lazy::force(&RECONCILIATIONS_TOTAL);
    Lazy::force(&SCALE_DECISIONS_TOTAL);
    Lazy::force(&WRITE_CONFLICTS_TOTAL);
    Lazy::force(&STATUS_WRITE_FAILURES_TOTAL);
    Lazy::force(&RECONCILE_DURATION_SECONDS);
}

/// Encode the default registry in the Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

async fn prometheus_metrics() -> impl IntoResponse {
    (StatusCode::OK, encode_metrics())
}

async fn healthz() -> &'static str {
    "ok"
}

pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .route("/healthz", get(healthz))
}

/// Serve /metrics and /healthz until the process exits
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);
    axum::serve(listener, router()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_registered_series() {
        init_metrics();
        SCALE_DECISIONS_TOTAL.with_label_values(&["Vertical"]).inc();

        let text = encode_metrics();
        assert!(text.contains("mpa_scale_decisions_total"));
        assert!(text.contains("mode=\"Vertical\""));
    }
}
