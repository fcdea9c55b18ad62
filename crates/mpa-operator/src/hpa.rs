//! HPA Manager
//!
//! Horizontal scaling is delegated to one HorizontalPodAutoscaler per
//! MultidimensionalPodAutoscaler, named `<mpa>-hpa` and owned by it so the
//! API server garbage-collects it with its parent. The manager keeps the
//! child's replica bounds and target in line with the parent spec.

use crate::crd::MultidimensionalPodAutoscaler;
use crate::engine::ReplicaBounds;
use crate::store::{ObjectStore, WriteOutcome};
use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use mpa_common::{MpaError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Label linking the HPA back to its MultidimensionalPodAutoscaler
pub const PARENT_LABEL: &str = "autoscaling.hacker-mpa.io/parent";
const MANAGED_BY: &str = "mpa-operator";

/// Result of syncing the HPA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HpaOutcome {
    Created,
    Updated,
    Unchanged,
    /// Lost a race with another writer; the next pass reconverges
    Conflict,
}

/// Build the HPA the parent asks for
pub fn desired_hpa(parent: &MultidimensionalPodAutoscaler, bounds: ReplicaBounds) -> Result<HorizontalPodAutoscaler> {
    let namespace = parent
        .namespace()
        .ok_or_else(|| MpaError::MissingNamespace(parent.name_any()))?;
    let owner = parent
        .controller_owner_ref(&())
        .ok_or_else(|| MpaError::internal(format!("{} has no uid yet", parent.name_any())))?;

    let target = &parent.spec.scale_target_ref;
    let labels = BTreeMap::from([
        (PARENT_LABEL.to_string(), parent.name_any()),
        ("app.kubernetes.io/managed-by".to_string(), MANAGED_BY.to_string()),
    ]);

    Ok(HorizontalPodAutoscaler {
        metadata: ObjectMeta {
            name: Some(parent.hpa_name()),
            namespace: Some(namespace),
            labels: Some(labels),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(HorizontalPodAutoscalerSpec {
            min_replicas: Some(bounds.min),
            max_replicas: bounds.max,
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some(target.api_version.clone()),
                kind: target.kind.clone(),
                name: target.name.clone(),
            },
            ..Default::default()
        }),
        status: None,
    })
}

/// UID of the object controlling `hpa`, if any
fn controller_uid(hpa: &HorizontalPodAutoscaler) -> Option<&str> {
    hpa.owner_references()
        .iter()
        .find(|o| o.controller == Some(true))
        .map(|o| o.uid.as_str())
}

/// The part of an HPA this operator owns: bounds, target and controller
fn projection(
    hpa: &HorizontalPodAutoscaler,
) -> (Option<i32>, Option<i32>, Option<&CrossVersionObjectReference>, Option<&str>) {
    let spec = hpa.spec.as_ref();
    (
        spec.and_then(|s| s.min_replicas),
        spec.map(|s| s.max_replicas),
        spec.map(|s| &s.scale_target_ref),
        controller_uid(hpa),
    )
}

/// Keeps the delegated HPA in sync with its parent
pub struct HpaManager {
    store: Arc<dyn ObjectStore>,
}

impl HpaManager {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Create the HPA if missing, replace it if the owned fields drifted.
    ///
    /// Replace carries the resourceVersion that was read; a concurrent
    /// writer turns into `HpaOutcome::Conflict`, never an error.
    pub async fn reconcile(&self, parent: &MultidimensionalPodAutoscaler, bounds: ReplicaBounds) -> Result<HpaOutcome> {
        let desired = desired_hpa(parent, bounds)?;
        let namespace = desired.namespace().unwrap_or_default();
        let name = desired.name_any();

        let Some(existing) = self.store.get_hpa(&namespace, &name).await? else {
            return match self.store.create_hpa(&namespace, &desired).await? {
                WriteOutcome::Written(_) => {
                    info!(hpa = %name, namespace = %namespace, min = bounds.min, max = bounds.max, "Created HPA");
                    Ok(HpaOutcome::Created)
                }
                WriteOutcome::Conflict => {
                    debug!(hpa = %name, namespace = %namespace, "HPA created concurrently");
                    Ok(HpaOutcome::Conflict)
                }
            };
        };

        if projection(&existing) == projection(&desired) {
            return Ok(HpaOutcome::Unchanged);
        }

        // Keep fields other controllers may have set; overwrite what we own
        let mut updated = existing.clone();
        updated.spec = desired.spec.map(|desired_spec| HorizontalPodAutoscalerSpec {
            min_replicas: desired_spec.min_replicas,
            max_replicas: desired_spec.max_replicas,
            scale_target_ref: desired_spec.scale_target_ref,
            ..existing.spec.clone().unwrap_or_default()
        });
        // Only one controller may be set; other owner references stay
        let mut owners: Vec<OwnerReference> = existing
            .owner_references()
            .iter()
            .filter(|o| o.controller != Some(true))
            .cloned()
            .collect();
        owners.extend(desired.metadata.owner_references.unwrap_or_default());
        if let Some(previous) = controller_uid(&existing).filter(|uid| Some(*uid) != parent.uid().as_deref()) {
            info!(hpa = %name, namespace = %namespace, previous_owner = %previous, "Taking over HPA controller reference");
        }
        updated.metadata.owner_references = Some(owners);
        updated
            .labels_mut()
            .extend(desired.metadata.labels.unwrap_or_default());

        match self.store.replace_hpa(&namespace, &updated).await? {
            WriteOutcome::Written(_) => {
                info!(hpa = %name, namespace = %namespace, min = bounds.min, max = bounds.max, "Updated HPA");
                Ok(HpaOutcome::Updated)
            }
            WriteOutcome::Conflict => {
                debug!(hpa = %name, namespace = %namespace, "HPA changed since read");
                Ok(HpaOutcome::Conflict)
            }
        }
    }
}
