//! Scaling policy and replica bounds

use crate::crd::PolicySpec;

/// Thresholds and vertical ceilings the decision engine works against.
///
/// CPU and memory thresholds are utilization percentages, QPS is requests
/// per second, latency is milliseconds. Vertical ceilings are millicores and
/// MiB. Memory and latency thresholds are optional hooks: `None` leaves the
/// dimension out of the evaluation entirely.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub cpu_upper_threshold: f64,
    pub memory_upper_threshold: Option<f64>,
    pub qps_upper_threshold: f64,
    pub latency_upper_threshold_ms: Option<f64>,
    pub max_vertical_cpu: i64,
    pub max_vertical_memory: i64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            cpu_upper_threshold: 80.0,
            memory_upper_threshold: None,
            qps_upper_threshold: 100.0,
            latency_upper_threshold_ms: None,
            max_vertical_cpu: 2000,
            max_vertical_memory: 4096,
        }
    }
}

impl Policy {
    /// Overlay per-resource overrides on top of the operator-wide policy.
    ///
    /// Each field is replaced independently; unset fields keep the operator value.
    pub fn with_overrides(&self, overrides: Option<&PolicySpec>) -> Policy {
        let Some(o) = overrides else {
            return self.clone();
        };

        Policy {
            cpu_upper_threshold: o.cpu_upper_threshold.unwrap_or(self.cpu_upper_threshold),
            memory_upper_threshold: o.memory_upper_threshold.or(self.memory_upper_threshold),
            qps_upper_threshold: o.qps_upper_threshold.unwrap_or(self.qps_upper_threshold),
            latency_upper_threshold_ms: o
                .latency_upper_threshold_ms
                .or(self.latency_upper_threshold_ms),
            max_vertical_cpu: o.max_vertical_cpu.unwrap_or(self.max_vertical_cpu),
            max_vertical_memory: o.max_vertical_memory.unwrap_or(self.max_vertical_memory),
        }
    }
}

/// Operator-wide fallbacks for resources that leave replica bounds unset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaDefaults {
    pub min_replicas: i32,
    pub max_replicas: i32,
}

impl Default for ReplicaDefaults {
    fn default() -> Self {
        Self {
            min_replicas: 1,
            max_replicas: 3,
        }
    }
}

/// Effective replica bounds after defaulting and clamping.
///
/// Always satisfies `1 <= min <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaBounds {
    pub min: i32,
    pub max: i32,
}

impl ReplicaBounds {
    /// Resolve bounds from optional spec values.
    ///
    /// An inverted pair is clamped (`max` raised to `min`), never rejected.
    pub fn resolve(min: Option<i32>, max: Option<i32>, defaults: &ReplicaDefaults) -> Self {
        let min = min.unwrap_or(defaults.min_replicas).max(1);
        let max = max.unwrap_or(defaults.max_replicas).max(min);
        Self { min, max }
    }

    /// Clamp a replica count into the bounds
    pub fn clamp(&self, replicas: i64) -> i32 {
        replicas.max(self.min as i64).min(self.max as i64) as i32
    }
}
