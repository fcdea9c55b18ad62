//! Scale decision types

use std::fmt;

/// Scaling dimension chosen for a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScaleMode {
    None,
    Vertical,
    Horizontal,
}

impl ScaleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleMode::None => "None",
            ScaleMode::Vertical => "Vertical",
            ScaleMode::Horizontal => "Horizontal",
        }
    }
}

impl fmt::Display for ScaleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the decision engine.
///
/// Only the field matching `mode` is populated: `new_cpu` or `new_memory`
/// for Vertical, `new_replicas` for Horizontal, nothing for None. Use the
/// constructors rather than building the struct by hand.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleDecision {
    pub mode: ScaleMode,
    /// Millicores
    pub new_cpu: Option<i64>,
    /// MiB
    pub new_memory: Option<i64>,
    pub new_replicas: Option<i32>,
    pub reason: String,
}

impl ScaleDecision {
    pub fn none(reason: impl Into<String>) -> Self {
        Self {
            mode: ScaleMode::None,
            new_cpu: None,
            new_memory: None,
            new_replicas: None,
            reason: reason.into(),
        }
    }

    pub fn vertical_cpu(millicores: i64, reason: impl Into<String>) -> Self {
        Self {
            mode: ScaleMode::Vertical,
            new_cpu: Some(millicores),
            new_memory: None,
            new_replicas: None,
            reason: reason.into(),
        }
    }

    pub fn vertical_memory(mib: i64, reason: impl Into<String>) -> Self {
        Self {
            mode: ScaleMode::Vertical,
            new_cpu: None,
            new_memory: Some(mib),
            new_replicas: None,
            reason: reason.into(),
        }
    }

    pub fn horizontal(replicas: i32, reason: impl Into<String>) -> Self {
        Self {
            mode: ScaleMode::Horizontal,
            new_cpu: None,
            new_memory: None,
            new_replicas: Some(replicas),
            reason: reason.into(),
        }
    }
}
