/// A single point-in-time observation of the target workload.
///
/// Utilization values are percentages of the requested resources, QPS is
/// requests per second across all replicas, latency is the p99 in
/// milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub cpu_utilization_pct: f64,
    pub memory_utilization_pct: f64,
    pub qps: f64,
    pub latency_p99_ms: f64,
}
