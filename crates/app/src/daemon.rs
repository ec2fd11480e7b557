use std::sync::Arc;

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use ray_controllers::{default_registry, start_all, wait_for_sync, BuiltController, ControllerFactory, KubeClients, WorkBuilders};
use ray_core::apis::ray::Ray;
use ray_core::{ResourceKind, UnitOfWork};
use ray_crd::KubeDefinitionStore;
use ray_kubehub::{KubeWatchSource, WatchSource};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;

/// Bring up the operator and run until Ctrl-C.
pub async fn run(settings: Settings) -> Result<()> {
    let client = ray_kubehub::build_client(settings.master_url.as_deref(), settings.kube_config_path.as_deref())
        .await
        .context("cannot build kube client")?;

    let store = KubeDefinitionStore::new(client.clone());
    ray_crd::create_or_update(&store, &ray_crd::definition())
        .await
        .context("cannot declare the Ray resource definition")?;

    let stop = CancellationToken::new();
    let deps = KubeClients::new(client.clone(), settings.namespace.clone());
    let factory = ControllerFactory::new(default_registry().freeze(), deps)
        .with_queue_capacity(settings.queue_capacity)
        .with_retry_policy(settings.retry.clone())
        .with_stop(stop.clone());

    let pods: Arc<dyn WatchSource> =
        Arc::new(KubeWatchSource::new(api::<Pod>(&client, settings.namespace.as_deref()), ResourceKind::Pod).with_resync(settings.resync));
    let rays: Arc<dyn WatchSource> =
        Arc::new(KubeWatchSource::new(api::<Ray>(&client, settings.namespace.as_deref()), ResourceKind::Ray).with_resync(settings.resync));

    let controllers = vec![
        factory.build(ResourceKind::Pod, pods, builders(ResourceKind::Pod))?,
        factory.build(ResourceKind::Ray, rays, builders(ResourceKind::Ray))?,
    ];
    let sources: Vec<Arc<dyn WatchSource>> = controllers.iter().map(|c| Arc::clone(&c.source)).collect();
    let watchers = start_all(&sources, &stop);

    tokio::select! {
        res = wait_for_sync(&sources, settings.sync_timeout) => res?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted before caches synced");
            shutdown(&stop, &controllers, watchers).await;
            return Ok(());
        }
    }
    info!(namespace = settings.namespace.as_deref().unwrap_or("<all>"), "controllers ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C; shutting down");
    }
    shutdown(&stop, &controllers, watchers).await;
    Ok(())
}

fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <K as kube::Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Every event syncs the object's key; updates with an unchanged resource
/// version (resyncs) are logged separately.
fn builders(kind: ResourceKind) -> WorkBuilders {
    WorkBuilders::new()
        .on_add(move |controller, obj| {
            debug!(kind = %kind, key = %obj.key(), "add");
            UnitOfWork::sync(Arc::clone(controller), obj.key().to_string())
        })
        .on_update(move |controller, old, new| {
            if old.resource_version() == new.resource_version() {
                debug!(kind = %kind, key = %new.key(), "resync");
            } else {
                debug!(kind = %kind, key = %new.key(), "update");
            }
            UnitOfWork::sync(Arc::clone(controller), new.key().to_string())
        })
        .on_delete(move |controller, obj| {
            debug!(kind = %kind, key = %obj.key(), "delete");
            UnitOfWork::sync(Arc::clone(controller), obj.key().to_string())
        })
}

async fn shutdown(stop: &CancellationToken, controllers: &[BuiltController], watchers: Vec<tokio::task::JoinHandle<()>>) {
    info!("shutting down");
    stop.cancel();
    for w in watchers {
        let _ = w.await;
    }
    for c in controllers {
        c.queue.stopped().await;
        debug!(kind = %c.kind, "queue stopped");
    }
}
