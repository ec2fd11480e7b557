use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Resource};
use ray_core::{ManagedObject, ResourceKind};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::SourceState;
use crate::{Lister, ResourceEventHandler, WatchSource};

/// List+watch source backed by `kube::runtime::watcher`.
///
/// The first full listing (and every relist after a watch restart) is diffed
/// against the cache; the source reports synced after the first one has been
/// delivered. With a resync period, cached objects are re-delivered as
/// updates on every tick.
pub struct KubeWatchSource<K> {
    api: Api<K>,
    resync: Option<Duration>,
    state: SourceState,
}

impl<K> KubeWatchSource<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    ManagedObject: From<K>,
{
    pub fn new(api: Api<K>, kind: ResourceKind) -> Self {
        Self { api, resync: None, state: SourceState::new(kind) }
    }

    /// Re-deliver cached objects every `period`; zero disables resync.
    pub fn with_resync(mut self, period: Duration) -> Self {
        self.resync = if period.is_zero() { None } else { Some(period) };
        self
    }

    async fn run(self: Arc<Self>, stop: CancellationToken) {
        let kind = self.state.kind();
        let stream = watcher::watcher(self.api.clone(), watcher::Config::default()).default_backoff();
        futures::pin_mut!(stream);
        let mut resync = self.resync.map(|p| tokio::time::interval_at(Instant::now() + p, p));
        info!(kind = %kind, resync_secs = ?self.resync.map(|d| d.as_secs()), "watcher started");
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = tick(&mut resync) => self.state.resync().await,
                ev = stream.next() => match ev {
                    Some(Ok(Event::Applied(o))) => self.state.applied(o.into()).await,
                    Some(Ok(Event::Deleted(o))) => self.state.deleted(o.into()).await,
                    Some(Ok(Event::Restarted(list))) => {
                        debug!(kind = %kind, count = list.len(), "watch restart");
                        self.state.relist(list.into_iter().map(ManagedObject::from).collect()).await;
                        self.state.mark_synced().await;
                    }
                    Some(Err(e)) => warn!(kind = %kind, error = %e, "watch error; backing off"),
                    None => {
                        warn!(kind = %kind, "watcher stream ended");
                        break;
                    }
                },
            }
        }
        info!(kind = %kind, "watcher stopped");
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[async_trait::async_trait]
impl<K> WatchSource for KubeWatchSource<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    ManagedObject: From<K>,
{
    fn kind(&self) -> ResourceKind { self.state.kind() }

    fn add_handler(&self, handler: Arc<dyn ResourceEventHandler>) { self.state.add_handler(handler) }

    fn start(self: Arc<Self>, stop: CancellationToken) -> JoinHandle<()> { tokio::spawn(self.run(stop)) }

    fn has_synced(&self) -> bool { self.state.has_synced() }

    async fn wait_synced(&self) { self.state.wait_synced().await }

    fn lister(&self) -> Lister { self.state.lister() }
}
