//! Controller factory: wires a watch source to a controller through a
//! dedicated retry queue.
//!
//! Every event is snapshotted through the kind registry, turned into a unit of
//! work by the caller's builder and submitted to the controller's own queue.
//! Events that cannot be snapshotted are logged and dropped.

use std::sync::Arc;

use metrics::counter;
use once_cell::sync::OnceCell;
use ray_core::{ControllerHandle, ManagedObject, ResourceKind, UnitOfWork};
use ray_kubehub::{ResourceEventHandler, WatchSource};
use ray_queue::{RetryPolicy, RetryQueue};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::registry::{KindRegistry, RegistryError};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

pub type AddBuilder = Arc<dyn Fn(&ControllerHandle, ManagedObject) -> UnitOfWork + Send + Sync>;
pub type UpdateBuilder = Arc<dyn Fn(&ControllerHandle, ManagedObject, ManagedObject) -> UnitOfWork + Send + Sync>;
pub type DeleteBuilder = AddBuilder;

/// Per-event builders of units of work. An event without a builder is ignored.
#[derive(Clone, Default)]
pub struct WorkBuilders {
    pub on_add: Option<AddBuilder>,
    pub on_update: Option<UpdateBuilder>,
    pub on_delete: Option<DeleteBuilder>,
}

impl WorkBuilders {
    pub fn new() -> Self { Self::default() }

    pub fn on_add<F>(mut self, f: F) -> Self
    where
        F: Fn(&ControllerHandle, ManagedObject) -> UnitOfWork + Send + Sync + 'static,
    {
        self.on_add = Some(Arc::new(f));
        self
    }

    pub fn on_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&ControllerHandle, ManagedObject, ManagedObject) -> UnitOfWork + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(f));
        self
    }

    pub fn on_delete<F>(mut self, f: F) -> Self
    where
        F: Fn(&ControllerHandle, ManagedObject) -> UnitOfWork + Send + Sync + 'static,
    {
        self.on_delete = Some(Arc::new(f));
        self
    }

    /// Every event syncs the affected object's key.
    pub fn sync_on_every_event() -> Self {
        Self::new()
            .on_add(|c, obj| UnitOfWork::sync(Arc::clone(c), obj.key().to_string()))
            .on_update(|c, _old, new| UnitOfWork::sync(Arc::clone(c), new.key().to_string()))
            .on_delete(|c, obj| UnitOfWork::sync(Arc::clone(c), obj.key().to_string()))
    }
}

/// A controller wired to its watch source and queue.
pub struct BuiltController {
    pub kind: ResourceKind,
    pub controller: ControllerHandle,
    pub source: Arc<dyn WatchSource>,
    pub queue: Arc<RetryQueue>,
}

pub struct ControllerFactory<D> {
    registry: Arc<KindRegistry<D>>,
    deps: D,
    queue_capacity: usize,
    policy: RetryPolicy,
    stop: CancellationToken,
}

impl<D: Send + Sync + 'static> ControllerFactory<D> {
    pub fn new(registry: Arc<KindRegistry<D>>, deps: D) -> Self {
        Self { registry, deps, queue_capacity: DEFAULT_QUEUE_CAPACITY, policy: RetryPolicy::never(), stop: CancellationToken::new() }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Policy attached to every submitted unit.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Queues stop when `stop` is cancelled.
    pub fn with_stop(mut self, stop: CancellationToken) -> Self {
        self.stop = stop;
        self
    }

    /// Build the controller for `kind` and subscribe it on `source`.
    /// Must be called inside a tokio runtime and before `source` is started.
    pub fn build(&self, kind: ResourceKind, source: Arc<dyn WatchSource>, builders: WorkBuilders) -> Result<BuiltController, RegistryError> {
        if source.kind() != kind {
            return Err(RegistryError::SourceKindMismatch { expected: kind, found: source.kind() });
        }
        let constructor = self.registry.lookup(kind)?;
        let queue = Arc::new(RetryQueue::with_stop(kind.as_str(), self.queue_capacity, self.stop.child_token()));
        let handler = Arc::new(QueueingHandler {
            kind,
            registry: Arc::clone(&self.registry),
            queue: Arc::clone(&queue),
            builders,
            policy: self.policy.clone(),
            controller: OnceCell::new(),
        });
        let controller = constructor(&self.deps, source.as_ref(), handler.clone());
        let _ = handler.controller.set(Arc::clone(&controller));
        info!(kind = %kind, capacity = self.queue_capacity, "controller built");
        Ok(BuiltController { kind, controller, source, queue })
    }
}

/// Watch-source listener that snapshots each event and queues the resulting work.
struct QueueingHandler<D> {
    kind: ResourceKind,
    registry: Arc<KindRegistry<D>>,
    queue: Arc<RetryQueue>,
    builders: WorkBuilders,
    policy: RetryPolicy,
    controller: OnceCell<ControllerHandle>,
}

impl<D> QueueingHandler<D> {
    fn snapshot(&self, event: &'static str, obj: &ManagedObject) -> Option<ManagedObject> {
        match self.registry.snapshot(self.kind, obj) {
            Ok(snap) => Some(snap),
            Err(e) => {
                warn!(kind = %self.kind, event, error = %e, "dropping event");
                counter!("snapshot_rejected_total", 1, "kind" => self.kind.as_str());
                None
            }
        }
    }

    fn controller(&self) -> Option<&ControllerHandle> {
        let c = self.controller.get();
        if c.is_none() {
            warn!(kind = %self.kind, "event before controller was built; dropping");
        }
        c
    }

    async fn enqueue(&self, event: &'static str, work: UnitOfWork) {
        let label = work.label().to_string();
        match self.queue.submit(work, self.policy.clone()).await {
            Ok(()) => trace!(kind = %self.kind, event, work = %label, "queued"),
            Err(e) => warn!(kind = %self.kind, event, work = %label, error = %e, "dropping event"),
        }
    }
}

#[async_trait::async_trait]
impl<D: Send + Sync + 'static> ResourceEventHandler for QueueingHandler<D> {
    async fn on_add(&self, obj: &ManagedObject) {
        let Some(build) = self.builders.on_add.as_ref() else { return };
        let Some(snap) = self.snapshot("add", obj) else { return };
        let Some(controller) = self.controller() else { return };
        let work = build(controller, snap);
        self.enqueue("add", work).await;
    }

    async fn on_update(&self, old: &ManagedObject, new: &ManagedObject) {
        let Some(build) = self.builders.on_update.as_ref() else { return };
        let Some(old) = self.snapshot("update", old) else { return };
        let Some(new) = self.snapshot("update", new) else { return };
        let Some(controller) = self.controller() else { return };
        let work = build(controller, old, new);
        self.enqueue("update", work).await;
    }

    async fn on_delete(&self, obj: &ManagedObject) {
        let Some(build) = self.builders.on_delete.as_ref() else { return };
        let Some(snap) = self.snapshot("delete", obj) else { return };
        let Some(controller) = self.controller() else { return };
        let work = build(controller, snap);
        self.enqueue("delete", work).await;
    }
}
