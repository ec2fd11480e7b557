use std::sync::Arc;

use kube::{Api, Client};
use ray_core::apis::ray::Ray;
use ray_core::{Controller, ControllerHandle, ManagedObject, ObjectKey, ReconcileError, ResourceKind};
use ray_kubehub::{Lister, ResourceEventHandler, WatchSource};
use tracing::{debug, info};

use crate::{namespaced_api, scoped_namespace, KubeClients};

pub(crate) fn snapshot(obj: &ManagedObject) -> Option<ManagedObject> { obj.as_ray().map(|r| ManagedObject::from(r.clone())) }

pub(crate) fn construct(deps: &KubeClients, source: &dyn WatchSource, handler: Arc<dyn ResourceEventHandler>) -> ControllerHandle {
    source.add_handler(handler);
    Arc::new(RayController::new(deps.client.clone(), source.lister(), deps.namespace.clone()))
}

/// Reconciles `Ray` clusters. Child pod management is not implemented; the
/// controller resolves the cluster and reports its desired size and conditions.
pub struct RayController {
    client: Client,
    rays: Lister,
    /// Only keys in this namespace are reconciled.
    namespace: Option<String>,
}

impl RayController {
    pub fn new(client: Client, rays: Lister, namespace: Option<String>) -> Self { Self { client, rays, namespace } }

    async fn resolve(&self, key: &ObjectKey) -> Result<Option<Ray>, ReconcileError> {
        let namespace = scoped_namespace(key, self.namespace.as_deref())?;
        if let Some(obj) = self.rays.get(key).await {
            return Ok(obj.as_ray().cloned());
        }
        debug!(key = %key, namespace, "ray not cached; reading through");
        let api: Api<Ray> = namespaced_api(&self.client, namespace);
        Ok(api.get_opt(&key.name).await?)
    }
}

#[async_trait::async_trait]
impl Controller for RayController {
    async fn sync(&self, key: &str) -> Result<(), ReconcileError> {
        let key: ObjectKey = key.parse()?;
        if key.kind != ResourceKind::Ray {
            return Err(ReconcileError::WrongKind { key: key.to_string(), expected: "Ray" });
        }
        let Some(ray) = self.resolve(&key).await? else {
            info!(key = %key, "ray gone");
            return Ok(());
        };
        let conditions = ray.status.as_ref().map(|s| s.conditions.len()).unwrap_or(0);
        info!(
            key = %key,
            head = ray.spec.head.replicas,
            workers = ray.spec.worker.replicas,
            desired_pods = ray.spec.desired_pods(),
            conditions,
            "ray synced"
        );
        Ok(())
    }
}
