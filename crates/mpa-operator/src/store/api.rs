//! ObjectStore backed by the Kubernetes API server

use super::{ObjectStore, WriteOutcome};
use crate::crd::{MultidimensionalPodAutoscaler, MultidimensionalPodAutoscalerStatus, ScaleTargetRef};
use crate::workload::Workload;
use async_trait::async_trait;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::{
    api::{Api, DynamicObject, Patch, PatchParams, PostParams},
    Client, ResourceExt,
};
use mpa_common::{MpaError, Result};
use serde_json::json;

/// HTTP status the API server answers with for stale resourceVersions and
/// for creates that collide with an existing name.
const CONFLICT: u16 = 409;

/// Kubernetes-backed object store
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl KubeStore {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }
}

/// Map a write result, turning a 409 into `WriteOutcome::Conflict`
fn conditional<T>(result: std::result::Result<T, kube::Error>) -> Result<WriteOutcome<T>> {
    match result {
        Ok(obj) => Ok(WriteOutcome::Written(obj)),
        Err(kube::Error::Api(resp)) if resp.code == CONFLICT => Ok(WriteOutcome::Conflict),
        Err(e) => Err(MpaError::Kube(e)),
    }
}

/// Merge patch body for a status write
fn status_patch(
    resource_version: Option<&str>,
    status: &MultidimensionalPodAutoscalerStatus,
) -> Result<serde_json::Value> {
    let mut patch = json!({ "status": serde_json::to_value(status)? });
    if let Some(rv) = resource_version {
        patch["metadata"] = json!({ "resourceVersion": rv });
    }
    Ok(patch)
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_autoscaler(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<MultidimensionalPodAutoscaler>> {
        let api: Api<MultidimensionalPodAutoscaler> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_autoscaler_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        status: &MultidimensionalPodAutoscalerStatus,
    ) -> Result<WriteOutcome<()>> {
        let api: Api<MultidimensionalPodAutoscaler> = Api::namespaced(self.client.clone(), namespace);

        // A resourceVersion inside a merge patch is a precondition; a null
        // one would be a delete directive, so leave metadata out instead
        let patch = status_patch(resource_version, status)?;

        let result = api
            .patch_status(
                name,
                &PatchParams::apply(&self.field_manager),
                &Patch::Merge(&patch),
            )
            .await
            .map(|_| ());
        conditional(result)
    }

    async fn get_workload(&self, namespace: &str, target: &ScaleTargetRef) -> Result<Option<Workload>> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &target.api_resource());
        Ok(api.get_opt(&target.name).await?.map(Workload::new))
    }

    async fn replace_workload(
        &self,
        namespace: &str,
        target: &ScaleTargetRef,
        workload: &Workload,
    ) -> Result<WriteOutcome<Workload>> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &target.api_resource());
        let result = api
            .replace(&workload.name(), &self.post_params(), workload.object())
            .await
            .map(Workload::new);
        conditional(result)
    }

    async fn get_hpa(&self, namespace: &str, name: &str) -> Result<Option<HorizontalPodAutoscaler>> {
        let api: Api<HorizontalPodAutoscaler> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_hpa(
        &self,
        namespace: &str,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<WriteOutcome<HorizontalPodAutoscaler>> {
        let api: Api<HorizontalPodAutoscaler> = Api::namespaced(self.client.clone(), namespace);
        conditional(api.create(&self.post_params(), hpa).await)
    }

    async fn replace_hpa(
        &self,
        namespace: &str,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<WriteOutcome<HorizontalPodAutoscaler>> {
        let api: Api<HorizontalPodAutoscaler> = Api::namespaced(self.client.clone(), namespace);
        conditional(api.replace(&hpa.name_any(), &self.post_params(), hpa).await)
    }
}
