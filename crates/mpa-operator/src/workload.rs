//! Scale target access
//!
//! The target of a MultidimensionalPodAutoscaler can be any workload kind
//! with a pod template (`Deployment`, `StatefulSet`, ...), so it is read as a
//! `DynamicObject` and only the fields the operator cares about are touched:
//! replica counts and the pod template's container resources.

use kube::api::DynamicObject;
use kube::ResourceExt;
use mpa_common::k8s::{format_cpu_millicores, format_memory_mib, parse_cpu_millicores, parse_memory_mib};
use mpa_common::{MpaError, Result};
use serde_json::{Map, Value};
use tracing::debug;

const CONTAINERS_PATH: &str = "/spec/template/spec/containers";

/// Target workload as read from the API server
#[derive(Debug, Clone)]
pub struct Workload {
    object: DynamicObject,
}

impl Workload {
    pub fn new(object: DynamicObject) -> Self {
        Self { object }
    }

    pub fn name(&self) -> String {
        self.object.name_any()
    }

    pub fn object(&self) -> &DynamicObject {
        &self.object
    }

    /// Replicas the workload actually runs: `status.replicas`, falling back
    /// to `spec.replicas` when the workload controller has not reported yet.
    pub fn observed_replicas(&self) -> Option<i32> {
        self.int_at("/status/replicas")
            .or_else(|| self.int_at("/spec/replicas"))
    }

    fn int_at(&self, pointer: &str) -> Option<i32> {
        self.object
            .data
            .pointer(pointer)
            .and_then(Value::as_i64)
            .and_then(|v| i32::try_from(v).ok())
    }

    /// CPU request (millicores) of every container in the pod template
    pub fn cpu_requests(&self) -> Vec<Option<i64>> {
        self.container_requests("cpu", parse_cpu_millicores)
    }

    /// Memory request (MiB) of every container in the pod template
    pub fn memory_requests(&self) -> Vec<Option<i64>> {
        self.container_requests("memory", parse_memory_mib)
    }

    fn container_requests(&self, resource: &str, parse: fn(&str) -> Option<i64>) -> Vec<Option<i64>> {
        self.object
            .data
            .pointer(CONTAINERS_PATH)
            .and_then(Value::as_array)
            .map(|containers| {
                containers
                    .iter()
                    .map(|c| {
                        c.pointer(&format!("/resources/requests/{}", resource))
                            .and_then(Value::as_str)
                            .and_then(parse)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Set the CPU (millicores) and/or memory (MiB) request on every container.
    ///
    /// Sidecars included: the autoscaler targets the workload as a whole and
    /// does not single out a container.
    ///
    /// A limit that would end up below the new request is raised to match it.
    /// Non-positive targets are ignored. Returns whether anything changed, so
    /// a workload already at the target is left untouched.
    pub fn apply_resources(&mut self, cpu: Option<i64>, memory: Option<i64>) -> Result<bool> {
        let name = self.name();
        let containers = self
            .object
            .data
            .pointer_mut(CONTAINERS_PATH)
            .and_then(Value::as_array_mut)
            .filter(|containers| !containers.is_empty())
            .ok_or_else(|| {
                MpaError::UnsupportedWorkload(format!("{} has no pod template containers", name))
            })?;

        let mut changed = false;
        for container in containers.iter_mut() {
            let Some(container) = container.as_object_mut() else {
                continue;
            };
            let container_name = container
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            let Some(resources) = object_entry(container, "resources") else {
                continue;
            };
            if let Some(millicores) = cpu.filter(|v| *v > 0) {
                if set_quantity(resources, "cpu", millicores, parse_cpu_millicores, format_cpu_millicores) {
                    debug!(container = %container_name, millicores, "Updated CPU request");
                    changed = true;
                }
            }
            if let Some(mib) = memory.filter(|v| *v > 0) {
                if set_quantity(resources, "memory", mib, parse_memory_mib, format_memory_mib) {
                    debug!(container = %container_name, mib, "Updated memory request");
                    changed = true;
                }
            }
        }

        Ok(changed)
    }
}

fn object_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Map<String, Value>> {
    if !matches!(map.get(key), Some(Value::Object(_))) {
        map.insert(key.to_string(), Value::Object(Map::new()));
    }
    map.get_mut(key).and_then(Value::as_object_mut)
}

/// Set `requests.<resource>` to `target` and lift `limits.<resource>` if it
/// is below the target. Returns whether either value changed.
fn set_quantity(
    resources: &mut Map<String, Value>,
    resource: &str,
    target: i64,
    parse: fn(&str) -> Option<i64>,
    format: fn(i64) -> String,
) -> bool {
    let mut changed = false;

    if let Some(requests) = object_entry(resources, "requests") {
        let current = requests.get(resource).and_then(Value::as_str).and_then(parse);
        if current != Some(target) {
            requests.insert(resource.to_string(), Value::String(format(target)));
            changed = true;
        }
    }

    if let Some(Value::Object(limits)) = resources.get_mut("limits") {
        let limit = limits.get(resource).and_then(Value::as_str).and_then(parse);
        if matches!(limit, Some(l) if l < target) {
            limits.insert(resource.to_string(), Value::String(format(target)));
            changed = true;
        }
    }

    changed
}
