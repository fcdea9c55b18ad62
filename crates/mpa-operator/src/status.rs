//! Status Reporter
//!
//! Computes the status a pass should leave behind and writes it to the
//! status subresource. Writing status is best effort: a failure here never
//! fails the reconcile, since the next pass recomputes the same status.

use crate::crd::{LastAction, MultidimensionalPodAutoscaler, MultidimensionalPodAutoscalerStatus};
use crate::metrics;
use crate::store::{ObjectStore, WriteOutcome};
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a reconcile pass did, as far as status is concerned
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub action: LastAction,
    pub reason: String,
    /// A scaling mutation (workload or HPA write) actually landed
    pub mutated: bool,
    /// Replicas observed on the workload
    pub current_replicas: Option<i32>,
    /// Replicas recommended by a horizontal decision
    pub desired_replicas: Option<i32>,
}

impl PassReport {
    pub fn waiting(reason: impl Into<String>) -> Self {
        Self {
            action: LastAction::WaitingForValidScaleTargetRef,
            reason: reason.into(),
            mutated: false,
            current_replicas: None,
            desired_replicas: None,
        }
    }
}

/// Outcome of a status write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWrite {
    /// Stored status already matched
    Skipped,
    Written,
    Conflict,
    Failed,
}

pub struct StatusReporter {
    store: Arc<dyn ObjectStore>,
}

impl StatusReporter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Status after a pass.
    ///
    /// `lastScaleTime` only moves when a scaling write landed, and never
    /// moves backwards. Replica counts a pass did not observe carry over.
    pub fn next_status(
        prev: Option<&MultidimensionalPodAutoscalerStatus>,
        report: &PassReport,
        now: DateTime<Utc>,
        generation: Option<i64>,
    ) -> MultidimensionalPodAutoscalerStatus {
        let prev_scale_time = prev.and_then(|s| s.last_scale_time.clone());

        let last_scale_time = if report.mutated && report.action.is_scaling() {
            match prev_scale_time {
                Some(Time(t)) if t > now => Some(Time(t)),
                _ => Some(Time(now)),
            }
        } else {
            prev_scale_time
        };

        MultidimensionalPodAutoscalerStatus {
            last_action: Some(report.action),
            reason: Some(report.reason.clone()),
            last_scale_time,
            current_replicas: report
                .current_replicas
                .or_else(|| prev.and_then(|s| s.current_replicas)),
            desired_replicas: report.desired_replicas,
            observed_generation: generation,
        }
    }

    /// Write `status` if it differs from what is stored on `mpa`.
    ///
    /// The write carries the resourceVersion `mpa` was read at. Conflicts
    /// and failures are logged and counted, never returned.
    pub async fn persist(
        &self,
        mpa: &MultidimensionalPodAutoscaler,
        status: &MultidimensionalPodAutoscalerStatus,
    ) -> StatusWrite {
        if mpa.status.as_ref() == Some(status) {
            return StatusWrite::Skipped;
        }

        let namespace = mpa.namespace().unwrap_or_default();
        let name = mpa.name_any();
        let resource_version = mpa.resource_version();

        match self
            .store
            .patch_autoscaler_status(&namespace, &name, resource_version.as_deref(), status)
            .await
        {
            Ok(WriteOutcome::Written(())) => StatusWrite::Written,
            Ok(WriteOutcome::Conflict) => {
                debug!(mpa = %name, namespace = %namespace, "Status changed since read, leaving it to the next pass");
                metrics::WRITE_CONFLICTS_TOTAL.with_label_values(&["status"]).inc();
                StatusWrite::Conflict
            }
            Err(e) => {
                warn!(mpa = %name, namespace = %namespace, error = %e, "Failed to update status");
                metrics::STATUS_WRITE_FAILURES_TOTAL.inc();
                StatusWrite::Failed
            }
        }
    }
}
