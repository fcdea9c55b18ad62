//! Load Metrics Client
//!
//! Produces the per-workload metrics snapshot the decision engine works on,
//! from the Prometheus HTTP API.

use crate::crd::ScaleTargetRef;
use crate::engine::MetricsSnapshot;
use async_trait::async_trait;
use mpa_common::{MpaError, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Source of metrics snapshots for a scale target
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn snapshot(&self, namespace: &str, target: &ScaleTargetRef) -> Result<MetricsSnapshot>;
}

/// PromQL templates, one per snapshot dimension.
///
/// `{namespace}` and `{name}` are replaced with the target's namespace and
/// name before the query is sent.
#[derive(Debug, Clone)]
pub struct MetricQueries {
    /// CPU usage as a percentage of requests
    pub cpu_utilization: String,
    /// Memory working set as a percentage of requests
    pub memory_utilization: String,
    /// Requests per second
    pub qps: String,
    /// p99 latency in milliseconds
    pub latency_p99: String,
}

impl Default for MetricQueries {
    fn default() -> Self {
        Self {
            cpu_utilization: r#"100 * sum(rate(container_cpu_usage_seconds_total{namespace="{namespace}",pod=~"{name}-.*",container!="",container!="POD"}[5m])) / sum(kube_pod_container_resource_requests{namespace="{namespace}",pod=~"{name}-.*",resource="cpu"})"#.into(),
            memory_utilization: r#"100 * sum(container_memory_working_set_bytes{namespace="{namespace}",pod=~"{name}-.*",container!="",container!="POD"}) / sum(kube_pod_container_resource_requests{namespace="{namespace}",pod=~"{name}-.*",resource="memory"})"#.into(),
            qps: r#"sum(rate(http_requests_total{namespace="{namespace}",pod=~"{name}-.*"}[1m]))"#.into(),
            latency_p99: r#"1000 * histogram_quantile(0.99, sum by (le) (rate(http_request_duration_seconds_bucket{namespace="{namespace}",pod=~"{name}-.*"}[5m])))"#.into(),
        }
    }
}

fn render(template: &str, namespace: &str, name: &str) -> String {
    template.replace("{namespace}", namespace).replace("{name}", name)
}

/// Prometheus query response structures
#[derive(Debug, Deserialize)]
struct PrometheusResponse {
    status: String,
    #[serde(default)]
    data: Option<PrometheusData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PrometheusData {
    #[serde(default)]
    result: Vec<PrometheusResult>,
}

#[derive(Debug, Deserialize)]
struct PrometheusResult {
    value: (f64, String),
}

/// First sample of an instant-vector response.
///
/// No series or a non-finite sample reads as 0: the workload is not
/// reporting load, which is not a breach.
fn first_value(response: PrometheusResponse) -> Result<f64> {
    if response.status != "success" {
        return Err(MpaError::Metrics(format!(
            "Prometheus query status: {} ({})",
            response.status,
            response.error.unwrap_or_default()
        )));
    }

    let Some(sample) = response.data.and_then(|d| d.result.into_iter().next()) else {
        return Ok(0.0);
    };

    let value: f64 = sample
        .value
        .1
        .parse()
        .map_err(|e| MpaError::Metrics(format!("bad sample value {:?}: {}", sample.value.1, e)))?;

    Ok(if value.is_finite() { value } else { 0.0 })
}

/// Metrics provider backed by a Prometheus server
pub struct PrometheusMetrics {
    base_url: String,
    queries: MetricQueries,
    http_client: reqwest::Client,
}

impl PrometheusMetrics {
    pub fn new(base_url: impl Into<String>, queries: MetricQueries, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MpaError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            queries,
            http_client,
        })
    }

    /// Query Prometheus for a single value
    async fn query(&self, query: &str) -> Result<f64> {
        let url = format!("{}/api/v1/query?query={}", self.base_url, urlencoding::encode(query));

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| MpaError::Metrics(format!("Prometheus request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(MpaError::Metrics(format!(
                "Prometheus query failed with status: {}",
                response.status()
            )));
        }

        let body: PrometheusResponse = response
            .json()
            .await
            .map_err(|e| MpaError::Metrics(format!("Prometheus response: {}", e)))?;

        first_value(body)
    }
}

#[async_trait]
impl MetricsProvider for PrometheusMetrics {
    async fn snapshot(&self, namespace: &str, target: &ScaleTargetRef) -> Result<MetricsSnapshot> {
        let name = target.name.as_str();
        let cpu = render(&self.queries.cpu_utilization, namespace, name);
        let memory = render(&self.queries.memory_utilization, namespace, name);
        let qps = render(&self.queries.qps, namespace, name);
        let latency = render(&self.queries.latency_p99, namespace, name);

        // Execute queries in parallel
        let (cpu, memory, qps, latency) = tokio::join!(
            self.query(&cpu),
            self.query(&memory),
            self.query(&qps),
            self.query(&latency)
        );

        let snapshot = MetricsSnapshot {
            cpu_utilization_pct: cpu?,
            memory_utilization_pct: memory?,
            qps: qps?,
            latency_p99_ms: latency?,
        };

        debug!(
            target = %target,
            cpu = snapshot.cpu_utilization_pct,
            memory = snapshot.memory_utilization_pct,
            qps = snapshot.qps,
            latency_ms = snapshot.latency_p99_ms,
            "Fetched metrics snapshot"
        );

        Ok(snapshot)
    }
}

/// Fixed snapshot for tests; can be switched to failing
#[cfg(test)]
pub struct StaticMetrics {
    snapshot: std::sync::Mutex<Option<MetricsSnapshot>>,
}

#[cfg(test)]
impl StaticMetrics {
    pub fn new(snapshot: MetricsSnapshot) -> Self {
        Self {
            snapshot: std::sync::Mutex::new(Some(snapshot)),
        }
    }

    pub fn failing() -> Self {
        Self {
            snapshot: std::sync::Mutex::new(None),
        }
    }

    pub fn set(&self, snapshot: MetricsSnapshot) {
        *self.snapshot.lock().unwrap() = Some(snapshot);
    }
}

#[cfg(test)]
#[async_trait]
impl MetricsProvider for StaticMetrics {
    async fn snapshot(&self, _namespace: &str, _target: &ScaleTargetRef) -> Result<MetricsSnapshot> {
        let snapshot = *self.snapshot.lock().unwrap();
        snapshot.ok_or_else(|| MpaError::Metrics("prometheus unreachable".into()))
    }
}
