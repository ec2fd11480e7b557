//! Ray operator controllers: kind registry, controller factory, the Pod and
//! Ray controllers and startup orchestration.

#![forbid(unsafe_code)]

pub mod factory;
pub mod pod;
pub mod ray;
pub mod registry;
pub mod startup;

use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use ray_core::{ObjectKey, ReconcileError, ResourceKind};

pub use factory::{BuiltController, ControllerFactory, WorkBuilders, DEFAULT_QUEUE_CAPACITY};
pub use pod::PodController;
pub use ray::RayController;
pub use registry::{ConstructorFn, KindRegistry, RegistryError, SnapshotError, SnapshotFn};
pub use startup::{start_all, wait_for_sync, StartupError};

/// Dependencies handed to every controller constructor.
#[derive(Clone)]
pub struct KubeClients {
    pub client: Client,
    /// Namespace the operator is scoped to; `None` watches all namespaces.
    pub namespace: Option<String>,
}

impl KubeClients {
    pub fn new(client: Client, namespace: Option<String>) -> Self { Self { client, namespace } }
}

/// Namespace to read `key` from. A key without a namespace falls back to
/// `scope`; a key outside `scope` is rejected.
pub(crate) fn scoped_namespace<'a>(key: &'a ObjectKey, scope: Option<&'a str>) -> Result<Option<&'a str>, ReconcileError> {
    match (key.namespace.as_deref(), scope) {
        (Some(ns), Some(scope)) if ns != scope => {
            Err(ReconcileError::OutOfScope { key: key.to_string(), namespace: scope.to_string() })
        }
        (Some(ns), _) => Ok(Some(ns)),
        (None, scope) => Ok(scope),
    }
}

/// `Api` for `namespace`, or the client's default namespace.
pub(crate) fn namespaced_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::default_namespaced(client.clone()),
    }
}

/// Registry with every kind this operator manages.
pub fn default_registry() -> KindRegistry<KubeClients> {
    let mut registry = KindRegistry::new();
    registry.register(ResourceKind::Pod, pod::snapshot, pod::construct);
    registry.register(ResourceKind::Ray, ray::snapshot, ray::construct);
    registry
}
