//! MPA Common Library
//!
//! Shared error type, configuration helpers and Kubernetes quantity handling
//! for the multidimensional pod autoscaler.

pub mod config;
pub mod error;
pub mod k8s;

// Re-export commonly used types
pub use config::TelemetrySettings;
pub use error::{MpaError, Result};
