//! Kubernetes reconciliation logic for MultidimensionalPodAutoscaler resources
//!
//! Every pass starts from what is stored right now: fetch the autoscaler,
//! check its target reference, read the workload and its metrics, decide,
//! apply, report. Nothing is carried between passes in memory, so a pass
//! that is interrupted or loses a write race is repaired by the next one.

use crate::config::ControllerConfig;
use crate::crd::{LastAction, MultidimensionalPodAutoscaler, ScaleTargetRef};
use crate::engine::{Engine, ReplicaBounds, ScaleDecision, ScaleMode, ScaleState};
use crate::hpa::{HpaManager, HpaOutcome};
use crate::load_metrics::MetricsProvider;
use crate::metrics;
use crate::status::{PassReport, StatusReporter};
use crate::store::{ObjectStore, WriteOutcome};
use crate::workload::Workload;
use kube::{runtime::controller::Action, ResourceExt};
use mpa_common::{MpaError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// Reconciler context
pub struct Context {
    pub store: Arc<dyn ObjectStore>,
    pub metrics: Arc<dyn MetricsProvider>,
    pub config: ControllerConfig,
}

/// What the apply step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Decision was None
    Nothing,
    Written,
    /// Workload or HPA already matched the decision
    Unchanged,
    /// Lost a write race; the next pass retries
    Conflict,
}

/// Result of one reconcile pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// The autoscaler no longer exists
    Deleted,
    /// scaleTargetRef is incomplete; nothing was read or written
    AwaitingValidTarget,
    Settled { mode: ScaleMode, applied: Applied },
}

impl Pass {
    /// Delay before the next pass; `None` waits for a watch event
    pub fn requeue_after(&self, config: &ControllerConfig) -> Option<Duration> {
        match self {
            Pass::Deleted => None,
            Pass::AwaitingValidTarget => Some(config.invalid_target_backoff),
            Pass::Settled { .. } => Some(config.reconcile_interval),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Pass::Deleted => "deleted",
            Pass::AwaitingValidTarget => "awaiting_target",
            Pass::Settled { .. } => "settled",
        }
    }
}

/// Run one pass for the autoscaler `namespace/name`
pub async fn reconcile_key(namespace: &str, name: &str, ctx: &Context) -> Result<Pass> {
    let Some(mpa) = ctx.store.get_autoscaler(namespace, name).await? else {
        debug!("Autoscaler is gone, nothing to do");
        return Ok(Pass::Deleted);
    };

    let reporter = StatusReporter::new(ctx.store.clone());
    let generation = mpa.metadata.generation;
    let target = &mpa.spec.scale_target_ref;

    if let Err(invalid) = target.validate() {
        info!(reason = %invalid, "Waiting for a valid scaleTargetRef");
        let status = StatusReporter::next_status(
            mpa.status.as_ref(),
            &PassReport::waiting(invalid.to_string()),
            chrono::Utc::now(),
            generation,
        );
        reporter.persist(&mpa, &status).await;
        return Ok(Pass::AwaitingValidTarget);
    }

    let workload = ctx
        .store
        .get_workload(namespace, target)
        .await?
        .ok_or_else(|| MpaError::TargetNotFound(target.to_string()))?;

    let snapshot = ctx.metrics.snapshot(namespace, target).await?;

    let bounds = mpa.bounds(&ctx.config.replica_defaults);
    let engine = Engine::new(ctx.config.policy.with_overrides(mpa.spec.policy.as_ref()));
    let observed_replicas = workload.observed_replicas();
    let decision = engine.decide(
        snapshot,
        &ScaleState {
            replicas: observed_replicas,
            bounds,
        },
    );

    metrics::SCALE_DECISIONS_TOTAL
        .with_label_values(&[decision.mode.as_str()])
        .inc();
    info!(mode = %decision.mode, reason = %decision.reason, "Scale decision");

    let applied = match decision.mode {
        ScaleMode::None => Applied::Nothing,
        ScaleMode::Vertical => apply_vertical(ctx, namespace, target, workload, &decision).await?,
        ScaleMode::Horizontal => apply_horizontal(ctx, &mpa, bounds).await?,
    };

    let report = PassReport {
        action: LastAction::from(decision.mode),
        reason: decision.reason.clone(),
        mutated: applied == Applied::Written,
        current_replicas: if decision.mode == ScaleMode::None {
            None
        } else {
            observed_replicas
        },
        desired_replicas: decision.new_replicas,
    };
    let status = StatusReporter::next_status(mpa.status.as_ref(), &report, chrono::Utc::now(), generation);
    reporter.persist(&mpa, &status).await;

    Ok(Pass::Settled {
        mode: decision.mode,
        applied,
    })
}

/// Write the new resource requests onto the workload
async fn apply_vertical(
    ctx: &Context,
    namespace: &str,
    target: &ScaleTargetRef,
    mut workload: Workload,
    decision: &ScaleDecision,
) -> Result<Applied> {
    if !workload.apply_resources(decision.new_cpu, decision.new_memory)? {
        debug!(workload = %target, "Resources already at target");
        return Ok(Applied::Unchanged);
    }

    match ctx.store.replace_workload(namespace, target, &workload).await? {
        WriteOutcome::Written(_) => {
            info!(
                workload = %target,
                cpu_millicores = ?decision.new_cpu,
                memory_mib = ?decision.new_memory,
                "Scaled workload vertically"
            );
            Ok(Applied::Written)
        }
        WriteOutcome::Conflict => {
            debug!(workload = %target, "Workload changed since read, deferring to the next pass");
            metrics::WRITE_CONFLICTS_TOTAL.with_label_values(&["workload"]).inc();
            Ok(Applied::Conflict)
        }
    }
}

/// Bring the delegated HPA in line with the autoscaler's bounds
async fn apply_horizontal(
    ctx: &Context,
    mpa: &MultidimensionalPodAutoscaler,
    bounds: ReplicaBounds,
) -> Result<Applied> {
    let outcome = HpaManager::new(ctx.store.clone()).reconcile(mpa, bounds).await?;
    Ok(match outcome {
        HpaOutcome::Created | HpaOutcome::Updated => Applied::Written,
        HpaOutcome::Unchanged => Applied::Unchanged,
        HpaOutcome::Conflict => {
            metrics::WRITE_CONFLICTS_TOTAL.with_label_values(&["hpa"]).inc();
            Applied::Conflict
        }
    })
}

/// Reconcile a MultidimensionalPodAutoscaler resource
#[instrument(skip(mpa, ctx), fields(mpa = %mpa.name_any(), namespace = ?mpa.namespace()))]
pub async fn reconcile(mpa: Arc<MultidimensionalPodAutoscaler>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = mpa
        .namespace()
        .ok_or_else(|| MpaError::MissingNamespace(mpa.name_any()))?;

    let timer = metrics::RECONCILE_DURATION_SECONDS.start_timer();
    let pass = reconcile_key(&namespace, &mpa.name_any(), &ctx).await;
    timer.observe_duration();

    let pass = pass?;
    metrics::RECONCILIATIONS_TOTAL
        .with_label_values(&[pass.label()])
        .inc();

    Ok(match pass.requeue_after(&ctx.config) {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    })
}

/// Requeue delay for a failed pass
fn backoff(error: &MpaError, config: &ControllerConfig) -> Duration {
    match error {
        // API server or Prometheus hiccup
        MpaError::Kube(_) | MpaError::Metrics(_) => config.error_backoff,
        // Target may be created any moment
        MpaError::TargetNotFound(_) => config.invalid_target_backoff,
        _ => config.reconcile_interval,
    }
}

/// Error handler for the controller
pub fn error_policy(mpa: Arc<MultidimensionalPodAutoscaler>, error: &MpaError, ctx: Arc<Context>) -> Action {
    error!(
        mpa = %mpa.name_any(),
        namespace = ?mpa.namespace(),
        code = error.code(),
        "Reconciliation error: {}",
        error
    );
    metrics::RECONCILIATIONS_TOTAL
        .with_label_values(&["error"])
        .inc();
    Action::requeue(backoff(error, &ctx.config))
}
