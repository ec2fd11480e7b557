use std::sync::{Arc, Mutex, PoisonError};

use ray_core::{ManagedObject, ResourceKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::state::SourceState;
use crate::{Lister, ResourceEventHandler, WatchSource};

/// Notification fed into a [`ChannelSource`].
#[derive(Debug, Clone)]
pub enum SourceEvent {
    Applied(ManagedObject),
    Deleted(ManagedObject),
    /// Full listing; marks the source synced once delivered.
    Relisted(Vec<ManagedObject>),
    Resync,
}

/// Watch source fed from an in-process channel instead of the API server.
pub struct ChannelSource {
    state: SourceState,
    rx: Mutex<Option<mpsc::Receiver<SourceEvent>>>,
}

impl ChannelSource {
    pub fn new(kind: ResourceKind, capacity: usize) -> (mpsc::Sender<SourceEvent>, Arc<Self>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Arc::new(Self { state: SourceState::new(kind), rx: Mutex::new(Some(rx)) }))
    }

    async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<SourceEvent>, stop: CancellationToken) {
        loop {
            let ev = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                ev = rx.recv() => match ev {
                    Some(ev) => ev,
                    None => break,
                },
            };
            match ev {
                SourceEvent::Applied(o) => self.state.applied(o).await,
                SourceEvent::Deleted(o) => self.state.deleted(o).await,
                SourceEvent::Relisted(list) => {
                    self.state.relist(list).await;
                    self.state.mark_synced().await;
                }
                SourceEvent::Resync => self.state.resync().await,
            }
        }
        debug!(kind = %self.state.kind(), "channel source stopped");
    }
}

#[async_trait::async_trait]
impl WatchSource for ChannelSource {
    fn kind(&self) -> ResourceKind { self.state.kind() }

    fn add_handler(&self, handler: Arc<dyn ResourceEventHandler>) { self.state.add_handler(handler) }

    fn start(self: Arc<Self>, stop: CancellationToken) -> JoinHandle<()> {
        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner).take();
        match rx {
            Some(rx) => tokio::spawn(self.run(rx, stop)),
            None => {
                warn!(kind = %self.state.kind(), "channel source already started");
                tokio::spawn(async {})
            }
        }
    }

    fn has_synced(&self) -> bool { self.state.has_synced() }

    async fn wait_synced(&self) { self.state.wait_synced().await }

    fn lister(&self) -> Lister { self.state.lister() }
}
