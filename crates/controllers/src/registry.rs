//! Kind registry: maps each resource kind to its snapshot function and its
//! controller constructor.
//!
//! Registration happens on one thread before any watch starts; `freeze` ends
//! that phase and hands out a shared, read-only registry.

use std::sync::Arc;

use ray_core::{ControllerHandle, ManagedObject, ResourceKind};
use ray_kubehub::{ResourceEventHandler, WatchSource};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Produce an immutable copy of `obj`, or `None` if it is not of the expected variant.
pub type SnapshotFn = fn(&ManagedObject) -> Option<ManagedObject>;

/// Build a controller from its dependencies, subscribing `handler` on the kind's watch source.
pub type ConstructorFn<D> = fn(&D, &dyn WatchSource, Arc<dyn ResourceEventHandler>) -> ControllerHandle;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("resource kind {0} is not registered")]
    UnregisteredKind(ResourceKind),
    #[error("watch source delivers {found} objects, expected {expected}")]
    SourceKindMismatch { expected: ResourceKind, found: ResourceKind },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("no snapshot function registered for {0}")]
    Unregistered(ResourceKind),
    #[error("expected a {expected} object, got {found}")]
    Mismatch { expected: ResourceKind, found: ResourceKind },
}

struct Registration<D> {
    snapshot: SnapshotFn,
    constructor: ConstructorFn<D>,
}

pub struct KindRegistry<D> {
    entries: FxHashMap<ResourceKind, Registration<D>>,
}

impl<D> Default for KindRegistry<D> {
    fn default() -> Self { Self { entries: FxHashMap::default() } }
}

impl<D> KindRegistry<D> {
    pub fn new() -> Self { Self::default() }

    /// Register `kind`. A second registration replaces the first.
    pub fn register(&mut self, kind: ResourceKind, snapshot: SnapshotFn, constructor: ConstructorFn<D>) {
        if self.entries.insert(kind, Registration { snapshot, constructor }).is_some() {
            debug!(kind = %kind, "kind registered again; replacing previous registration");
        }
    }

    pub fn lookup(&self, kind: ResourceKind) -> Result<ConstructorFn<D>, RegistryError> {
        self.entries.get(&kind).map(|r| r.constructor).ok_or(RegistryError::UnregisteredKind(kind))
    }

    pub fn snapshot(&self, kind: ResourceKind, obj: &ManagedObject) -> Result<ManagedObject, SnapshotError> {
        let reg = self.entries.get(&kind).ok_or(SnapshotError::Unregistered(kind))?;
        (reg.snapshot)(obj).ok_or(SnapshotError::Mismatch { expected: kind, found: obj.kind() })
    }

    pub fn is_registered(&self, kind: ResourceKind) -> bool { self.entries.contains_key(&kind) }

    pub fn kinds(&self) -> Vec<ResourceKind> {
        let mut out: Vec<_> = self.entries.keys().copied().collect();
        out.sort();
        out
    }

    /// End the registration phase.
    pub fn freeze(self) -> Arc<Self> { Arc::new(self) }
}
