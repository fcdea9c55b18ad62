//! Error types for the MPA operator

use std::fmt;

/// Result type alias using MpaError
pub type Result<T> = std::result::Result<T, MpaError>;

/// Main error type for the MPA operator
#[derive(Debug, thiserror::Error)]
pub enum MpaError {
    /// Kubernetes API error (transport, 5xx, unexpected 4xx)
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Object is namespaced but arrived without a namespace
    #[error("Resource {0} has no namespace")]
    MissingNamespace(String),

    /// The workload named by scaleTargetRef does not exist
    #[error("Scale target not found: {0}")]
    TargetNotFound(String),

    /// The workload exists but cannot be scaled the way it was asked to
    #[error("Unsupported workload: {0}")]
    UnsupportedWorkload(String),

    /// Metrics collaborator failed to produce a snapshot
    #[error("Metrics query failed: {0}")]
    Metrics(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MpaError {
    /// Create an internal error from any error type
    pub fn internal<E: fmt::Display>(err: E) -> Self {
        MpaError::Internal(err.to_string())
    }

    /// Get the error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            MpaError::Kube(_) => "KUBERNETES_ERROR",
            MpaError::MissingNamespace(_) => "MISSING_NAMESPACE",
            MpaError::TargetNotFound(_) => "TARGET_NOT_FOUND",
            MpaError::UnsupportedWorkload(_) => "UNSUPPORTED_WORKLOAD",
            MpaError::Metrics(_) => "METRICS_ERROR",
            MpaError::Serialization(_) => "SERIALIZATION_ERROR",
            MpaError::Config(_) => "CONFIG_ERROR",
            MpaError::Internal(_) => "INTERNAL",
        }
    }

    /// Whether a later retry can reasonably succeed without anyone editing the resource
    pub fn is_transient(&self) -> bool {
        matches!(self, MpaError::Kube(_) | MpaError::Metrics(_))
    }
}

impl From<serde_json::Error> for MpaError {
    fn from(err: serde_json::Error) -> Self {
        MpaError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(MpaError::TargetNotFound("web".into()).code(), "TARGET_NOT_FOUND");
        assert_eq!(MpaError::Metrics("timeout".into()).code(), "METRICS_ERROR");
        assert_eq!(MpaError::internal("boom").code(), "INTERNAL");
    }

    #[test]
    fn test_transient_classification() {
        assert!(MpaError::Metrics("prometheus down".into()).is_transient());
        assert!(!MpaError::TargetNotFound("apps/v1 Deployment web".into()).is_transient());
        assert!(!MpaError::UnsupportedWorkload("no pod template".into()).is_transient());
    }

    #[test]
    fn test_serde_json_conversion() {
        let err: MpaError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.code(), "SERIALIZATION_ERROR");
    }
}
