use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::kind::ParseKeyError;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    InvalidKey(#[from] ParseKeyError),
    #[error("key {key} routed to the {expected} controller")]
    WrongKind { key: String, expected: &'static str },
    #[error("key {key} is outside namespace {namespace}")]
    OutOfScope { key: String, namespace: String },
    #[error("kube api: {0}")]
    Kube(#[from] kube::Error),
    #[error("attempt panicked: {0}")]
    Panicked(String),
    #[error("{0}")]
    Failed(String),
}

impl ReconcileError {
    pub fn failed(msg: impl Into<String>) -> Self { ReconcileError::Failed(msg.into()) }
}

/// The single operation every kind-specific controller implements.
#[async_trait::async_trait]
pub trait Controller: Send + Sync {
    /// Drive the object named by `key` (`Kind/namespace/name`) toward its desired state.
    async fn sync(&self, key: &str) -> Result<(), ReconcileError>;
}

pub type ControllerHandle = Arc<dyn Controller>;

pub type WorkFuture = BoxFuture<'static, Result<(), ReconcileError>>;

/// Deferred, fallible reconciliation bound to one event.
///
/// The closure is re-invoked on every retry, so it must be able to build a
/// fresh future each time.
pub struct UnitOfWork {
    label: String,
    run: Box<dyn FnMut() -> WorkFuture + Send>,
}

impl UnitOfWork {
    pub fn new<F, Fut>(label: impl Into<String>, mut f: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ReconcileError>> + Send + 'static,
    {
        Self { label: label.into(), run: Box::new(move || f().boxed()) }
    }

    /// Unit that calls `controller.sync(key)` on every attempt.
    pub fn sync(controller: ControllerHandle, key: String) -> Self {
        let label = key.clone();
        Self::new(label, move || {
            let controller = Arc::clone(&controller);
            let key = key.clone();
            async move { controller.sync(&key).await }
        })
    }

    pub fn label(&self) -> &str { &self.label }

    pub fn attempt(&mut self) -> WorkFuture { (self.run)() }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork").field("label", &self.label).finish_non_exhaustive()
    }
}
