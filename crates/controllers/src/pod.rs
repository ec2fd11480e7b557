use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use ray_core::{Controller, ControllerHandle, ManagedObject, ObjectKey, ReconcileError, ResourceKind};
use ray_kubehub::{Lister, ResourceEventHandler, WatchSource};
use tracing::{debug, info};

use crate::{namespaced_api, scoped_namespace, KubeClients};

pub(crate) fn snapshot(obj: &ManagedObject) -> Option<ManagedObject> { obj.as_pod().map(|p| ManagedObject::from(p.clone())) }

pub(crate) fn construct(deps: &KubeClients, source: &dyn WatchSource, handler: Arc<dyn ResourceEventHandler>) -> ControllerHandle {
    source.add_handler(handler);
    Arc::new(PodController::new(deps.client.clone(), source.lister(), deps.namespace.clone()))
}

/// Pods are observed only; the controller resolves the pod and reports its phase.
pub struct PodController {
    client: Client,
    pods: Lister,
    /// Only keys in this namespace are reconciled.
    namespace: Option<String>,
}

impl PodController {
    pub fn new(client: Client, pods: Lister, namespace: Option<String>) -> Self { Self { client, pods, namespace } }

    async fn resolve(&self, key: &ObjectKey) -> Result<Option<Pod>, ReconcileError> {
        let namespace = scoped_namespace(key, self.namespace.as_deref())?;
        if let Some(obj) = self.pods.get(key).await {
            return Ok(obj.as_pod().cloned());
        }
        debug!(key = %key, namespace, "pod not cached; reading through");
        let api: Api<Pod> = namespaced_api(&self.client, namespace);
        Ok(api.get_opt(&key.name).await?)
    }
}

#[async_trait::async_trait]
impl Controller for PodController {
    async fn sync(&self, key: &str) -> Result<(), ReconcileError> {
        let key: ObjectKey = key.parse()?;
        if key.kind != ResourceKind::Pod {
            return Err(ReconcileError::WrongKind { key: key.to_string(), expected: "Pod" });
        }
        match self.resolve(&key).await? {
            Some(pod) => {
                let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref()).unwrap_or("Unknown");
                let node = pod.spec.as_ref().and_then(|s| s.node_name.as_deref()).unwrap_or("");
                info!(key = %key, phase, node, "pod synced");
            }
            None => info!(key = %key, "pod gone"),
        }
        Ok(())
    }
}
