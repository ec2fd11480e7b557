//! Ray operator kubehub: watch sources and kube client wiring.
//!
//! A watch source delivers add/update/delete notifications for one resource
//! kind to subscribed handlers, keeps a cache of the objects it has seen and
//! reports when its initial listing has been fully delivered.

#![forbid(unsafe_code)]

mod channel;
mod source;
mod state;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use ray_core::{ManagedObject, ResourceKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use channel::{ChannelSource, SourceEvent};
pub use source::KubeWatchSource;
pub use state::Lister;

/// Callbacks invoked by a watch source, in delivery order, from the source's task.
/// A slow handler slows down delivery for that source only.
#[async_trait::async_trait]
pub trait ResourceEventHandler: Send + Sync {
    async fn on_add(&self, obj: &ManagedObject);
    async fn on_update(&self, old: &ManagedObject, new: &ManagedObject);
    async fn on_delete(&self, obj: &ManagedObject);
}

#[async_trait::async_trait]
pub trait WatchSource: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Subscribe a handler. Handlers must be added before [`WatchSource::start`].
    fn add_handler(&self, handler: Arc<dyn ResourceEventHandler>);

    /// Begin delivery on a new task; it runs until `stop` is cancelled.
    fn start(self: Arc<Self>, stop: CancellationToken) -> JoinHandle<()>;

    /// True once the initial listing has been delivered to every handler.
    fn has_synced(&self) -> bool;

    /// Resolve once [`WatchSource::has_synced`] turns true.
    async fn wait_synced(&self) {
        while !self.has_synced() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    fn lister(&self) -> Lister;
}

/// Build a client from an explicit kubeconfig file (or the inferred
/// in-cluster/default config), optionally pointing it at another API server URL.
pub async fn build_client(master_url: Option<&str>, kubeconfig: Option<&Path>) -> Result<Client> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kc = Kubeconfig::read_from(path).with_context(|| format!("reading kubeconfig {}", path.display()))?;
            Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default())
                .await
                .context("loading kubeconfig")?
        }
        None => Config::infer().await.context("inferring kube config")?,
    };
    if let Some(url) = master_url.filter(|u| !u.is_empty()) {
        config.cluster_url = url.parse().with_context(|| format!("parsing master url {}", url))?;
    }
    info!(cluster = %config.cluster_url, "kube client configured");
    Client::try_from(config).context("building kube client")
}
