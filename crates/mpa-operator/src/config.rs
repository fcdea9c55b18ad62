//! Controller configuration

use crate::engine::{Policy, ReplicaDefaults};
use std::time::Duration;

/// Settings every reconcile pass reads; built once in `main`
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Requeue delay after a settled pass
    pub reconcile_interval: Duration,
    /// Requeue delay while scaleTargetRef is incomplete
    pub invalid_target_backoff: Duration,
    /// Requeue delay after a transient failure (API server, metrics)
    pub error_backoff: Duration,
    pub replica_defaults: ReplicaDefaults,
    /// Operator-wide thresholds; `spec.policy` overrides per resource
    pub policy: Policy,
    /// Field manager recorded on every write
    pub field_manager: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(30),
            invalid_target_backoff: Duration::from_secs(10),
            error_backoff: Duration::from_secs(10),
            replica_defaults: ReplicaDefaults::default(),
            policy: Policy::default(),
            field_manager: "mpa-operator".into(),
        }
    }
}
