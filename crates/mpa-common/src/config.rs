//! Configuration utilities for the MPA operator

use serde::{Deserialize, Serialize};

/// Telemetry/observability settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySettings {
    /// Service name attached to log lines
    pub service_name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Enable JSON log format
    pub json_logs: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            service_name: "mpa-operator".into(),
            log_level: "info".into(),
            json_logs: false,
        }
    }
}

/// Check that a set of replica defaults is usable.
///
/// Resources are never rejected for inverted bounds, but the operator's own
/// fallbacks must be sane or every clamped resource inherits the mistake.
pub fn validate_replica_defaults(min: i32, max: i32) -> Result<(), String> {
    if min < 1 {
        return Err(format!("default min replicas must be at least 1, got {}", min));
    }
    if max < min {
        return Err(format!(
            "default max replicas ({}) must not be below default min replicas ({})",
            max, min
        ));
    }
    Ok(())
}

/// Parse a boolean-ish environment value ("1", "true", "yes", "on")
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
