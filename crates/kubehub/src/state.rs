use std::sync::Arc;

use arc_swap::ArcSwap;
use metrics::counter;
use ray_core::{ManagedObject, ObjectKey, ResourceKind};
use rustc_hash::FxHashMap;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use crate::ResourceEventHandler;

type Cache = FxHashMap<ObjectKey, ManagedObject>;

/// Read-only view of a watch source's cache of last-seen objects.
#[derive(Clone)]
pub struct Lister {
    kind: ResourceKind,
    cache: Arc<RwLock<Cache>>,
}

impl Lister {
    /// Lister over an empty cache that never fills.
    pub fn empty(kind: ResourceKind) -> Self { Self { kind, cache: Arc::new(RwLock::new(Cache::default())) } }

    pub fn kind(&self) -> ResourceKind { self.kind }

    pub async fn get(&self, key: &ObjectKey) -> Option<ManagedObject> { self.cache.read().await.get(key).cloned() }

    /// All cached objects, ordered by key.
    pub async fn list(&self) -> Vec<ManagedObject> {
        let mut out: Vec<_> = self.cache.read().await.values().cloned().collect();
        out.sort_by_key(|o| o.key());
        out
    }

    pub async fn len(&self) -> usize { self.cache.read().await.len() }

    pub async fn is_empty(&self) -> bool { self.cache.read().await.is_empty() }
}

/// Cache, handler list and sync flag shared by every watch source
/// implementation. Turns raw applied/deleted/relisted notifications into
/// add/update/delete callbacks.
pub(crate) struct SourceState {
    kind: ResourceKind,
    handlers: ArcSwap<Vec<Arc<dyn ResourceEventHandler>>>,
    cache: Arc<RwLock<Cache>>,
    synced: watch::Sender<bool>,
}

impl SourceState {
    pub(crate) fn new(kind: ResourceKind) -> Self {
        let (synced, _) = watch::channel(false);
        Self { kind, handlers: ArcSwap::from_pointee(Vec::new()), cache: Arc::new(RwLock::new(Cache::default())), synced }
    }

    pub(crate) fn kind(&self) -> ResourceKind { self.kind }

    pub(crate) fn add_handler(&self, handler: Arc<dyn ResourceEventHandler>) {
        self.handlers.rcu(|cur| {
            let mut next = Vec::clone(cur);
            next.push(Arc::clone(&handler));
            next
        });
    }

    pub(crate) fn lister(&self) -> Lister { Lister { kind: self.kind, cache: Arc::clone(&self.cache) } }

    pub(crate) fn has_synced(&self) -> bool { *self.synced.borrow() }

    pub(crate) async fn wait_synced(&self) {
        let mut rx = self.synced.subscribe();
        let _ = rx.wait_for(|synced| *synced).await;
    }

    pub(crate) async fn mark_synced(&self) {
        if !self.synced.send_replace(true) {
            let objects = self.cache.read().await.len();
            info!(kind = %self.kind, objects, "cache synced");
        }
    }

    /// Object created or modified; an update when the key is already cached.
    pub(crate) async fn applied(&self, obj: ManagedObject) {
        let prev = self.cache.write().await.insert(obj.key(), obj.clone());
        match prev {
            Some(old) => self.emit_update(&old, &obj).await,
            None => self.emit_add(&obj).await,
        }
    }

    pub(crate) async fn deleted(&self, obj: ManagedObject) {
        self.cache.write().await.remove(&obj.key());
        self.emit_delete(&obj).await;
    }

    /// Full listing: replaces the cache, then emits adds/updates in listing
    /// order followed by deletes for objects that disappeared.
    pub(crate) async fn relist(&self, objs: Vec<ManagedObject>) {
        let mut previous = {
            let mut cache = self.cache.write().await;
            let previous = std::mem::take(&mut *cache);
            for o in &objs {
                cache.insert(o.key(), o.clone());
            }
            previous
        };
        debug!(kind = %self.kind, listed = objs.len(), cached = previous.len(), "relist");
        for o in &objs {
            match previous.remove(&o.key()) {
                Some(old) => self.emit_update(&old, o).await,
                None => self.emit_add(o).await,
            }
        }
        let mut gone: Vec<_> = previous.into_values().collect();
        gone.sort_by_key(|o| o.key());
        for o in &gone {
            self.emit_delete(o).await;
        }
    }

    /// Re-deliver every cached object as an update with identical old and new.
    pub(crate) async fn resync(&self) {
        let mut items: Vec<_> = self.cache.read().await.values().cloned().collect();
        items.sort_by_key(|o| o.key());
        debug!(kind = %self.kind, objects = items.len(), "resync");
        for o in &items {
            self.emit_update(o, o).await;
        }
    }

    async fn emit_add(&self, obj: &ManagedObject) {
        counter!("watch_events_total", 1, "kind" => self.kind.as_str(), "event" => "add");
        for h in self.handlers.load_full().iter() {
            h.on_add(obj).await;
        }
    }

    async fn emit_update(&self, old: &ManagedObject, new: &ManagedObject) {
        counter!("watch_events_total", 1, "kind" => self.kind.as_str(), "event" => "update");
        for h in self.handlers.load_full().iter() {
            h.on_update(old, new).await;
        }
    }

    async fn emit_delete(&self, obj: &ManagedObject) {
        counter!("watch_events_total", 1, "kind" => self.kind.as_str(), "event" => "delete");
        for h in self.handlers.load_full().iter() {
            h.on_delete(obj).await;
        }
    }
}
