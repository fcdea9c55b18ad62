//! Scale Decision Engine
//!
//! Maps a metrics snapshot and the current workload state to exactly one
//! scaling action. Pure and total: no I/O, no failure path, a decision for
//! every input (NaN metrics compare false and never breach).
//!
//! Evaluation order, first match wins:
//! 1. CPU utilization above threshold -> Vertical (CPU ceiling)
//! 2. QPS above threshold -> Horizontal
//! 3. Memory utilization above threshold, if set -> Vertical (memory ceiling)
//! 4. p99 latency above threshold, if set -> Horizontal
//! 5. Otherwise -> None
//!
//! All comparisons are strict: sitting exactly on a threshold is not a breach.

mod decision;
mod policy;
mod snapshot;

pub use decision::{ScaleDecision, ScaleMode};
pub use policy::{Policy, ReplicaBounds, ReplicaDefaults};
pub use snapshot::MetricsSnapshot;

/// Workload state the engine needs besides the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleState {
    /// Replicas currently observed on the workload, if known
    pub replicas: Option<i32>,
    pub bounds: ReplicaBounds,
}

/// Decision engine bound to a policy
#[derive(Debug, Clone)]
pub struct Engine {
    policy: Policy,
}

impl Engine {
    pub fn new(policy: Policy) -> Self {
        Self { policy }
    }

    /// Decide the single scaling action for this snapshot
    pub fn decide(&self, snapshot: MetricsSnapshot, state: &ScaleState) -> ScaleDecision {
        let p = &self.policy;

        if snapshot.cpu_utilization_pct > p.cpu_upper_threshold {
            return ScaleDecision::vertical_cpu(p.max_vertical_cpu, "cpu utilization high");
        }

        if snapshot.qps > p.qps_upper_threshold {
            let replicas = horizontal_target(snapshot.qps, p.qps_upper_threshold, state);
            return ScaleDecision::horizontal(replicas, "qps high");
        }

        if let Some(threshold) = p.memory_upper_threshold {
            if snapshot.memory_utilization_pct > threshold {
                return ScaleDecision::vertical_memory(
                    p.max_vertical_memory,
                    "memory utilization high",
                );
            }
        }

        if let Some(threshold) = p.latency_upper_threshold_ms {
            if snapshot.latency_p99_ms > threshold {
                let replicas = horizontal_target(snapshot.latency_p99_ms, threshold, state);
                return ScaleDecision::horizontal(replicas, "latency high");
            }
        }

        ScaleDecision::none("within thresholds")
    }
}

/// Replicas needed to bring `observed` back under `threshold`, assuming load
/// spreads evenly. Never recommends fewer than one extra replica for a breach,
/// always lands inside the bounds.
fn horizontal_target(observed: f64, threshold: f64, state: &ScaleState) -> i32 {
    let bounds = state.bounds;
    let current = state.replicas.filter(|r| *r > 0).unwrap_or(bounds.min) as i64;

    let proportional = if threshold > 0.0 {
        (current as f64 * observed / threshold).ceil()
    } else {
        f64::INFINITY
    };

    let desired = if proportional.is_finite() && proportional < i32::MAX as f64 {
        (proportional as i64).max(current + 1)
    } else {
        bounds.max as i64
    };

    bounds.clamp(desired)
}
