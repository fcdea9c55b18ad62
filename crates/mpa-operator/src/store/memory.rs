//! In-memory ObjectStore for reconciler tests
//!
//! Keeps one map per object kind and a single resourceVersion counter, and
//! enforces the same preconditions as the API server: a write carrying a
//! stale resourceVersion, or a create over an existing name, is a conflict.

use super::{ObjectStore, WriteOutcome};
use crate::crd::{MultidimensionalPodAutoscaler, MultidimensionalPodAutoscalerStatus, ScaleTargetRef};
use crate::workload::Workload;
use async_trait::async_trait;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::api::DynamicObject;
use kube::ResourceExt;
use mpa_common::{MpaError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// Object kinds the store can count writes for or fail on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Autoscaler,
    Workload,
    Hpa,
}

#[derive(Default)]
struct State {
    version: u64,
    autoscalers: HashMap<Key, MultidimensionalPodAutoscaler>,
    workloads: HashMap<Key, DynamicObject>,
    hpas: HashMap<Key, HorizontalPodAutoscaler>,
    writes: HashMap<Kind, usize>,
    /// Kinds whose next write lands after a concurrent writer
    race_next: Vec<Kind>,
    /// Kinds whose reads fail
    unavailable: Vec<Kind>,
    /// Kinds whose writes fail
    rejecting: Vec<Kind>,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn check_available(&self, kind: Kind) -> Result<()> {
        if self.unavailable.contains(&kind) {
            return Err(MpaError::internal(format!("{:?} store unavailable", kind)));
        }
        Ok(())
    }

    fn check_writable(&self, kind: Kind) -> Result<()> {
        if self.rejecting.contains(&kind) {
            return Err(MpaError::internal(format!("{:?} writes rejected", kind)));
        }
        Ok(())
    }

    /// Consume a pending race for `kind`; true if one was pending
    fn take_race(&mut self, kind: Kind) -> bool {
        match self.race_next.iter().position(|k| *k == kind) {
            Some(idx) => {
                self.race_next.remove(idx);
                true
            }
            None => false,
        }
    }

    fn record_write(&mut self, kind: Kind) {
        *self.writes.entry(kind).or_default() += 1;
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_autoscaler(&self, mut mpa: MultidimensionalPodAutoscaler) {
        let mut state = self.state.lock().unwrap();
        mpa.metadata.resource_version = Some(state.next_version());
        if mpa.metadata.uid.is_none() {
            mpa.metadata.uid = Some(format!("uid-{}", mpa.name_any()));
        }
        let ns = mpa.namespace().unwrap_or_default();
        state.autoscalers.insert(key(&ns, &mpa.name_any()), mpa);
    }

    pub fn insert_workload(&self, mut object: DynamicObject) {
        let mut state = self.state.lock().unwrap();
        object.metadata.resource_version = Some(state.next_version());
        let ns = object.namespace().unwrap_or_default();
        state.workloads.insert(key(&ns, &object.name_any()), object);
    }

    pub fn insert_hpa(&self, mut hpa: HorizontalPodAutoscaler) {
        let mut state = self.state.lock().unwrap();
        hpa.metadata.resource_version = Some(state.next_version());
        let ns = hpa.namespace().unwrap_or_default();
        state.hpas.insert(key(&ns, &hpa.name_any()), hpa);
    }

    /// Simulate an edit to the MPA spec (bumps generation and resourceVersion)
    pub fn update_autoscaler(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut MultidimensionalPodAutoscaler)) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        if let Some(mpa) = state.autoscalers.get_mut(&key(namespace, name)) {
            edit(mpa);
            mpa.metadata.generation = Some(mpa.metadata.generation.unwrap_or(1) + 1);
            mpa.metadata.resource_version = Some(version);
        }
    }

    pub fn remove_autoscaler(&self, namespace: &str, name: &str) {
        self.state.lock().unwrap().autoscalers.remove(&key(namespace, name));
    }

    /// Make the next write of `kind` lose against a concurrent writer: the
    /// stored object's resourceVersion moves on before the write is checked.
    pub fn race_next_write(&self, kind: Kind) {
        self.state.lock().unwrap().race_next.push(kind);
    }

    pub fn set_unavailable(&self, kind: Kind) {
        self.state.lock().unwrap().unavailable.push(kind);
    }

    /// Fail every write of `kind`; reads keep working
    pub fn reject_writes(&self, kind: Kind) {
        self.state.lock().unwrap().rejecting.push(kind);
    }

    pub fn writes(&self, kind: Kind) -> usize {
        self.state.lock().unwrap().writes.get(&kind).copied().unwrap_or(0)
    }

    pub fn autoscaler(&self, namespace: &str, name: &str) -> Option<MultidimensionalPodAutoscaler> {
        self.state.lock().unwrap().autoscalers.get(&key(namespace, name)).cloned()
    }

    pub fn workload(&self, namespace: &str, name: &str) -> Option<Workload> {
        self.state
            .lock()
            .unwrap()
            .workloads
            .get(&key(namespace, name))
            .cloned()
            .map(Workload::new)
    }

    pub fn hpa(&self, namespace: &str, name: &str) -> Option<HorizontalPodAutoscaler> {
        self.state.lock().unwrap().hpas.get(&key(namespace, name)).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_autoscaler(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<MultidimensionalPodAutoscaler>> {
        let state = self.state.lock().unwrap();
        state.check_available(Kind::Autoscaler)?;
        Ok(state.autoscalers.get(&key(namespace, name)).cloned())
    }

    async fn patch_autoscaler_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        status: &MultidimensionalPodAutoscalerStatus,
    ) -> Result<WriteOutcome<()>> {
        let mut state = self.state.lock().unwrap();
        state.check_writable(Kind::Autoscaler)?;
        if state.take_race(Kind::Autoscaler) {
            let version = state.next_version();
            if let Some(mpa) = state.autoscalers.get_mut(&key(namespace, name)) {
                mpa.metadata.resource_version = Some(version);
            }
        }

        let version = state.next_version();
        let Some(mpa) = state.autoscalers.get_mut(&key(namespace, name)) else {
            return Err(MpaError::internal(format!("autoscaler {}/{} not found", namespace, name)));
        };
        if resource_version.is_some() && mpa.metadata.resource_version.as_deref() != resource_version {
            return Ok(WriteOutcome::Conflict);
        }
        mpa.status = Some(status.clone());
        mpa.metadata.resource_version = Some(version);
        state.record_write(Kind::Autoscaler);
        Ok(WriteOutcome::Written(()))
    }

    async fn get_workload(&self, namespace: &str, target: &ScaleTargetRef) -> Result<Option<Workload>> {
        let state = self.state.lock().unwrap();
        state.check_available(Kind::Workload)?;
        Ok(state
            .workloads
            .get(&key(namespace, &target.name))
            .filter(|obj| obj.types.as_ref().map(|t| t.kind.as_str()) == Some(target.kind.as_str()))
            .cloned()
            .map(Workload::new))
    }

    async fn replace_workload(
        &self,
        namespace: &str,
        _target: &ScaleTargetRef,
        workload: &Workload,
    ) -> Result<WriteOutcome<Workload>> {
        let mut state = self.state.lock().unwrap();
        state.check_writable(Kind::Workload)?;
        let k = key(namespace, &workload.name());
        if state.take_race(Kind::Workload) {
            let version = state.next_version();
            if let Some(stored) = state.workloads.get_mut(&k) {
                stored.metadata.resource_version = Some(version);
            }
        }

        let current = state.workloads.get(&k).and_then(|o| o.resource_version());
        if current.is_none() || current != workload.object().resource_version() {
            return Ok(WriteOutcome::Conflict);
        }

        let mut object = workload.object().clone();
        object.metadata.resource_version = Some(state.next_version());
        state.workloads.insert(k, object.clone());
        state.record_write(Kind::Workload);
        Ok(WriteOutcome::Written(Workload::new(object)))
    }

    async fn get_hpa(&self, namespace: &str, name: &str) -> Result<Option<HorizontalPodAutoscaler>> {
        let state = self.state.lock().unwrap();
        state.check_available(Kind::Hpa)?;
        Ok(state.hpas.get(&key(namespace, name)).cloned())
    }

    async fn create_hpa(
        &self,
        namespace: &str,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<WriteOutcome<HorizontalPodAutoscaler>> {
        let mut state = self.state.lock().unwrap();
        state.check_writable(Kind::Hpa)?;
        let k = key(namespace, &hpa.name_any());
        if state.take_race(Kind::Hpa) && !state.hpas.contains_key(&k) {
            // Someone else created it first
            let mut theirs = hpa.clone();
            theirs.metadata.namespace = Some(namespace.to_string());
            theirs.metadata.resource_version = Some(state.next_version());
            state.hpas.insert(k.clone(), theirs);
        }
        if state.hpas.contains_key(&k) {
            return Ok(WriteOutcome::Conflict);
        }

        let mut created = hpa.clone();
        created.metadata.namespace = Some(namespace.to_string());
        created.metadata.resource_version = Some(state.next_version());
        state.hpas.insert(k, created.clone());
        state.record_write(Kind::Hpa);
        Ok(WriteOutcome::Written(created))
    }

    async fn replace_hpa(
        &self,
        namespace: &str,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<WriteOutcome<HorizontalPodAutoscaler>> {
        let mut state = self.state.lock().unwrap();
        state.check_writable(Kind::Hpa)?;
        let k = key(namespace, &hpa.name_any());
        if state.take_race(Kind::Hpa) {
            let version = state.next_version();
            if let Some(stored) = state.hpas.get_mut(&k) {
                stored.metadata.resource_version = Some(version);
            }
        }

        let current = state.hpas.get(&k).and_then(|o| o.resource_version());
        if current.is_none() || current != hpa.resource_version() {
            return Ok(WriteOutcome::Conflict);
        }

        let mut replaced = hpa.clone();
        replaced.metadata.resource_version = Some(state.next_version());
        state.hpas.insert(k, replaced.clone());
        state.record_write(Kind::Hpa);
        Ok(WriteOutcome::Written(replaced))
    }
}
