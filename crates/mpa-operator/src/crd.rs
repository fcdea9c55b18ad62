//! Kubernetes Custom Resource Definitions for the MPA operator

use crate::engine::{ReplicaBounds, ReplicaDefaults, ScaleMode};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::core::{ApiResource, GroupVersionKind};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// MultidimensionalPodAutoscaler Custom Resource
///
/// Declares the workload to scale and the replica bounds for horizontal
/// scaling. Thresholds come from the operator configuration unless
/// `spec.policy` overrides them for this resource.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[kube(
    group = "autoscaling.hacker-mpa.io",
    version = "v1alpha1",
    kind = "MultidimensionalPodAutoscaler",
    plural = "multidimensionalpodautoscalers",
    shortname = "mpa",
    status = "MultidimensionalPodAutoscalerStatus",
    namespaced,
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.scaleTargetRef.name"}"#,
    printcolumn = r#"{"name":"Min","type":"integer","jsonPath":".spec.minReplicas"}"#,
    printcolumn = r#"{"name":"Max","type":"integer","jsonPath":".spec.maxReplicas"}"#,
    printcolumn = r#"{"name":"Last Action","type":"string","jsonPath":".status.lastAction"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MultidimensionalPodAutoscalerSpec {
    /// Workload to scale
    pub scale_target_ref: ScaleTargetRef,

    /// Lower replica bound for horizontal scaling (operator default: 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub min_replicas: Option<i32>,

    /// Upper replica bound for horizontal scaling (operator default: 3).
    /// A value below minReplicas is treated as minReplicas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub max_replicas: Option<i32>,

    /// Per-resource overrides of the operator's scaling thresholds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicySpec>,
}

/// Reference to the scaled workload
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScaleTargetRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

/// scaleTargetRef is missing one or more required fields
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("scaleTargetRef is missing {}", .missing.join(", "))]
pub struct InvalidScaleTargetRef {
    pub missing: Vec<&'static str>,
}

impl ScaleTargetRef {
    /// Check that apiVersion, kind and name are all non-blank
    pub fn validate(&self) -> Result<(), InvalidScaleTargetRef> {
        let missing: Vec<&'static str> = [
            ("apiVersion", &self.api_version),
            ("kind", &self.kind),
            ("name", &self.name),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(InvalidScaleTargetRef { missing })
        }
    }

    /// Split apiVersion into (group, version); the core group has no slash.
    pub fn group_version(&self) -> (&str, &str) {
        match self.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", self.api_version.as_str()),
        }
    }

    /// API resource for dynamic access to the target
    pub fn api_resource(&self) -> ApiResource {
        let (group, version) = self.group_version();
        ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, &self.kind))
    }
}

impl fmt::Display for ScaleTargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.api_version, self.kind, self.name)
    }
}

/// Threshold overrides; every field is optional and falls back to the
/// operator-wide policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    /// CPU utilization percentage above which the workload is scaled vertically
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_upper_threshold: Option<f64>,

    /// Memory utilization percentage above which memory is scaled vertically
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_upper_threshold: Option<f64>,

    /// Requests per second above which the workload is scaled horizontally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qps_upper_threshold: Option<f64>,

    /// p99 latency in milliseconds above which the workload is scaled horizontally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_upper_threshold_ms: Option<f64>,

    /// CPU request in millicores applied on vertical scale-up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_vertical_cpu: Option<i64>,

    /// Memory request in MiB applied on vertical scale-up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_vertical_memory: Option<i64>,
}

/// Observed state of a MultidimensionalPodAutoscaler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultidimensionalPodAutoscalerStatus {
    /// Outcome of the most recent reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<LastAction>,

    /// Human-readable reason behind lastAction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Last time a scaling mutation was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scale_time: Option<Time>,

    /// Replicas observed on the workload after the last scaling pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_replicas: Option<i32>,

    /// Replica count recommended by the last horizontal decision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_replicas: Option<i32>,

    /// Generation of the spec this status was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Value of status.lastAction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub enum LastAction {
    WaitingForValidScaleTargetRef,
    None,
    Vertical,
    Horizontal,
}

impl LastAction {
    /// Whether this action can have mutated the workload or its HPA
    pub fn is_scaling(&self) -> bool {
        matches!(self, LastAction::Vertical | LastAction::Horizontal)
    }
}

impl From<ScaleMode> for LastAction {
    fn from(mode: ScaleMode) -> Self {
        match mode {
            ScaleMode::None => LastAction::None,
            ScaleMode::Vertical => LastAction::Vertical,
            ScaleMode::Horizontal => LastAction::Horizontal,
        }
    }
}

impl MultidimensionalPodAutoscaler {
    /// Effective replica bounds, clamped so that max is never below min
    pub fn bounds(&self, defaults: &ReplicaDefaults) -> ReplicaBounds {
        ReplicaBounds::resolve(self.spec.min_replicas, self.spec.max_replicas, defaults)
    }

    /// Name of the owned HorizontalPodAutoscaler
    pub fn hpa_name(&self) -> String {
        format!("{}-hpa", kube::ResourceExt::name_any(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    fn target(api_version: &str, kind: &str, name: &str) -> ScaleTargetRef {
        ScaleTargetRef {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }

    #[test]
    fn test_validate_complete_ref() {
        assert!(target("apps/v1", "Deployment", "web").validate().is_ok());
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let err = target("apps/v1", "", "web").validate().unwrap_err();
        assert_eq!(err.missing, vec!["kind"]);
        assert_eq!(err.to_string(), "scaleTargetRef is missing kind");

        let err = target(" ", "", "").validate().unwrap_err();
        assert_eq!(err.missing, vec!["apiVersion", "kind", "name"]);
    }

    #[test]
    fn test_group_version() {
        assert_eq!(target("apps/v1", "Deployment", "web").group_version(), ("apps", "v1"));
        assert_eq!(target("v1", "ReplicationController", "rc").group_version(), ("", "v1"));

        let ar = target("apps/v1", "StatefulSet", "db").api_resource();
        assert_eq!(ar.group, "apps");
        assert_eq!(ar.version, "v1");
        assert_eq!(ar.kind, "StatefulSet");
        assert_eq!(ar.plural, "statefulsets");
    }

    #[test]
    fn test_spec_deserializes_without_bounds() {
        let spec: MultidimensionalPodAutoscalerSpec = serde_json::from_value(serde_json::json!({
            "scaleTargetRef": {"apiVersion": "apps/v1", "kind": "Deployment", "name": "web"}
        }))
        .unwrap();

        assert_eq!(spec.min_replicas, None);
        assert_eq!(spec.max_replicas, None);
        assert_eq!(spec.policy, None);

        let mpa = MultidimensionalPodAutoscaler::new("web-mpa", spec);
        assert_eq!(
            mpa.bounds(&ReplicaDefaults::default()),
            ReplicaBounds { min: 1, max: 3 }
        );
        assert_eq!(mpa.hpa_name(), "web-mpa-hpa");
    }

    #[test]
    fn test_status_serialization() {
        let status = MultidimensionalPodAutoscalerStatus {
            last_action: Some(LastAction::WaitingForValidScaleTargetRef),
            reason: Some("scaleTargetRef is missing kind".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["lastAction"], "WaitingForValidScaleTargetRef");
        assert!(value.get("lastScaleTime").is_none());
    }

    #[test]
    fn test_crd_metadata() {
        let crd = MultidimensionalPodAutoscaler::crd();
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("multidimensionalpodautoscalers.autoscaling.hacker-mpa.io")
        );
        assert_eq!(crd.spec.names.short_names, Some(vec!["mpa".to_string()]));
    }
}
