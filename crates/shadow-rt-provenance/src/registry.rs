//! Session-scoped registry of shadow state.
//!
//! Four independent tables: frames, heap objects, class/lexical scopes and
//! globals. The first three are keyed weakly by host entity identity, so a
//! shadow entity lives exactly as long as its host entity (plus at most one
//! sweep interval). Globals live for the whole session.

use crate::activation::ShadowActivationRecord;
use crate::heap::{ShadowObject, ShadowScope};
use crate::node::ProvenanceNode;
use crate::weak_table::WeakKeyTable;
use serde::Serialize;
use shadow_rt_core::{GlobalName, Host, Result, ShadowError, TracerConfig};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared handle to a frame's shadow record.
pub type SharedRecord<V> = Arc<Mutex<ShadowActivationRecord<V>>>;
/// Shared handle to an object's instance-property shadow.
pub type SharedObject<V> = Arc<Mutex<ShadowObject<V>>>;
/// Shared handle to a scope's class-variable shadow.
pub type SharedScope<V> = Arc<Mutex<ShadowScope<V>>>;

pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, what: &'static str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| ShadowError::LockPoisoned(what))
}

/// Live entry counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub frames: usize,
    pub objects: usize,
    pub scopes: usize,
    pub globals: usize,
}

/// Entries dropped by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub frames: usize,
    pub objects: usize,
    pub scopes: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.frames + self.objects + self.scopes
    }
}

type FrameTable<H> =
    WeakKeyTable<<H as Host>::Frame, Mutex<ShadowActivationRecord<<H as Host>::Value>>>;
type ObjectTable<H> = WeakKeyTable<<H as Host>::Object, Mutex<ShadowObject<<H as Host>::Value>>>;
type ScopeTable<H> = WeakKeyTable<<H as Host>::Scope, Mutex<ShadowScope<<H as Host>::Value>>>;

pub struct ShadowRegistry<H: Host> {
    frames: Mutex<FrameTable<H>>,
    objects: Mutex<ObjectTable<H>>,
    scopes: Mutex<ScopeTable<H>>,
    globals: Mutex<HashMap<GlobalName, ProvenanceNode<H::Value>>>,
}

impl<H: Host> Default for ShadowRegistry<H> {
    fn default() -> Self {
        Self::new(&TracerConfig::default())
    }
}

impl<H: Host> ShadowRegistry<H> {
    pub fn new(config: &TracerConfig) -> Self {
        Self::with_sweep_interval(config.sweep_interval)
    }

    pub fn with_sweep_interval(sweep_interval: usize) -> Self {
        Self {
            frames: Mutex::new(WeakKeyTable::new(sweep_interval)),
            objects: Mutex::new(WeakKeyTable::new(sweep_interval)),
            scopes: Mutex::new(WeakKeyTable::new(sweep_interval)),
            globals: Mutex::new(HashMap::new()),
        }
    }

    pub fn find_frame(&self, frame: &Arc<H::Frame>) -> Result<Option<SharedRecord<H::Value>>> {
        Ok(lock(&self.frames, "frames")?.get(frame))
    }

    pub fn find_or_add_frame(&self, frame: &Arc<H::Frame>) -> Result<SharedRecord<H::Value>> {
        Ok(lock(&self.frames, "frames")?
            .get_or_insert_with(frame, || Mutex::new(ShadowActivationRecord::new())))
    }

    /// Bind a fresh record to `frame`, replacing whatever was there.
    pub fn attach_frame(&self, frame: &Arc<H::Frame>) -> Result<SharedRecord<H::Value>> {
        Ok(lock(&self.frames, "frames")?.insert(frame, Mutex::new(ShadowActivationRecord::new())))
    }

    /// Forget a frame's record before its key dies; returns whether one existed.
    pub fn release_frame(&self, frame: &Arc<H::Frame>) -> Result<bool> {
        Ok(lock(&self.frames, "frames")?.remove(frame).is_some())
    }

    pub fn find_object(&self, object: &Arc<H::Object>) -> Result<Option<SharedObject<H::Value>>> {
        Ok(lock(&self.objects, "objects")?.get(object))
    }

    pub fn find_or_add_object(&self, object: &Arc<H::Object>) -> Result<SharedObject<H::Value>> {
        Ok(lock(&self.objects, "objects")?.get_or_insert_with(object, || Mutex::new(ShadowObject::new())))
    }

    pub fn find_scope(&self, scope: &Arc<H::Scope>) -> Result<Option<SharedScope<H::Value>>> {
        Ok(lock(&self.scopes, "scopes")?.get(scope))
    }

    pub fn find_or_add_scope(&self, scope: &Arc<H::Scope>) -> Result<SharedScope<H::Value>> {
        Ok(lock(&self.scopes, "scopes")?.get_or_insert_with(scope, || Mutex::new(ShadowScope::new())))
    }

    pub fn find_global(&self, name: &GlobalName) -> Result<Option<ProvenanceNode<H::Value>>> {
        Ok(lock(&self.globals, "globals")?.get(name).cloned())
    }

    /// Latest provenance of a global, storing UNKNOWN the first time it is read.
    pub fn find_or_add_global(&self, name: &GlobalName) -> Result<ProvenanceNode<H::Value>> {
        Ok(lock(&self.globals, "globals")?
            .entry(name.clone())
            .or_insert_with(ProvenanceNode::unknown)
            .clone())
    }

    pub fn write_global(&self, name: &GlobalName, node: ProvenanceNode<H::Value>) -> Result<()> {
        lock(&self.globals, "globals")?.insert(name.clone(), node);
        Ok(())
    }

    /// Drop every entry whose host entity is gone.
    pub fn sweep(&self) -> Result<SweepReport> {
        let report = SweepReport {
            frames: lock(&self.frames, "frames")?.sweep(),
            objects: lock(&self.objects, "objects")?.sweep(),
            scopes: lock(&self.scopes, "scopes")?.sweep(),
        };
        tracing::debug!(
            frames = report.frames,
            objects = report.objects,
            scopes = report.scopes,
            "Swept shadow registry"
        );
        Ok(report)
    }

    pub fn stats(&self) -> Result<RegistryStats> {
        Ok(RegistryStats {
            frames: lock(&self.frames, "frames")?.live_len(),
            objects: lock(&self.objects, "objects")?.live_len(),
            scopes: lock(&self.scopes, "scopes")?.live_len(),
            globals: lock(&self.globals, "globals")?.len(),
        })
    }
}
