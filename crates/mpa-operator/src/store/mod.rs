//! Object store seam
//!
//! Every object the reconciler touches is read and written through
//! [`ObjectStore`]. Writes are conditional on the `resourceVersion` carried by
//! the object that was read; a stale version comes back as
//! [`WriteOutcome::Conflict`] instead of an error, so callers have to decide
//! what a concurrent writer means for them.

mod api;
#[cfg(test)]
pub mod memory;

pub use api::KubeStore;

use crate::crd::{MultidimensionalPodAutoscaler, MultidimensionalPodAutoscalerStatus, ScaleTargetRef};
use crate::workload::Workload;
use async_trait::async_trait;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use mpa_common::Result;

/// Result of a conditional write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    /// The write landed; carries the object as stored (new resourceVersion)
    Written(T),
    /// The object changed since it was read, or was created by someone else
    Conflict,
}

/// Reads and optimistic-concurrency writes against the cluster
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a MultidimensionalPodAutoscaler; `None` if it no longer exists
    async fn get_autoscaler(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<MultidimensionalPodAutoscaler>>;

    /// Write the status subresource, conditional on `resource_version`
    async fn patch_autoscaler_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        status: &MultidimensionalPodAutoscalerStatus,
    ) -> Result<WriteOutcome<()>>;

    /// Fetch the workload named by `target`; `None` if it does not exist
    async fn get_workload(&self, namespace: &str, target: &ScaleTargetRef) -> Result<Option<Workload>>;

    /// Replace the workload, conditional on its resourceVersion
    async fn replace_workload(
        &self,
        namespace: &str,
        target: &ScaleTargetRef,
        workload: &Workload,
    ) -> Result<WriteOutcome<Workload>>;

    async fn get_hpa(&self, namespace: &str, name: &str) -> Result<Option<HorizontalPodAutoscaler>>;

    /// Create the HPA; an existing object with the same name is a conflict
    async fn create_hpa(
        &self,
        namespace: &str,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<WriteOutcome<HorizontalPodAutoscaler>>;

    /// Replace the HPA, conditional on its resourceVersion
    async fn replace_hpa(
        &self,
        namespace: &str,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<WriteOutcome<HorizontalPodAutoscaler>>;
}
