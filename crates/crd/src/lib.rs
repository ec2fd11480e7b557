//! Ray CRD: the `rays.ray.io` definition and its create-or-update lifecycle.
//!
//! The definition must exist before any watch on `Ray` objects starts. An
//! existing definition is left untouched (no schema drift reconciliation).

#![forbid(unsafe_code)]

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, PostParams};
use kube::{Client, CustomResourceExt};
use ray_core::apis::{self, ray::Ray};
use tracing::info;

pub const PLURAL: &str = "rays";
pub const SINGULAR: &str = "ray";
pub const GROUP: &str = apis::GROUP;
pub const VERSION: &str = apis::VERSION;
/// `<plural>.<group>`, the definition's object name.
pub const FULL_NAME: &str = "rays.ray.io";

/// The Ray CustomResourceDefinition, schema derived from the Rust types.
pub fn definition() -> CustomResourceDefinition { Ray::crd() }

pub fn to_yaml(crd: &CustomResourceDefinition) -> Result<String, serde_yaml::Error> { serde_yaml::to_string(crd) }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("CustomResourceDefinition has no metadata.name")]
    Unnamed,
    #[error("failed to create CustomResourceDefinition {name}: {source}")]
    Create {
        name: String,
        #[source]
        source: kube::Error,
    },
}

/// Where definitions get declared.
#[async_trait::async_trait]
pub trait DefinitionStore: Send + Sync {
    /// Create `crd`; an existing definition of the same name is `AlreadyExists`, not an error.
    async fn create(&self, crd: &CustomResourceDefinition) -> Result<CreateOutcome, kube::Error>;
}

/// API server backed store.
pub struct KubeDefinitionStore {
    api: Api<CustomResourceDefinition>,
}

impl KubeDefinitionStore {
    pub fn new(client: Client) -> Self { Self { api: Api::all(client) } }
}

#[async_trait::async_trait]
impl DefinitionStore for KubeDefinitionStore {
    async fn create(&self, crd: &CustomResourceDefinition) -> Result<CreateOutcome, kube::Error> {
        match self.api.create(&PostParams::default(), crd).await {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(CreateOutcome::AlreadyExists),
            Err(e) => Err(e),
        }
    }
}

/// Ensure `crd` is declared. Creates it when absent and is a no-op when present.
pub async fn create_or_update(store: &dyn DefinitionStore, crd: &CustomResourceDefinition) -> Result<CreateOutcome, DefinitionError> {
    let name = crd.metadata.name.clone().ok_or(DefinitionError::Unnamed)?;
    let outcome = store
        .create(crd)
        .await
        .map_err(|source| DefinitionError::Create { name: name.clone(), source })?;
    match outcome {
        CreateOutcome::Created => info!(crd = %name, "CustomResourceDefinition created"),
        CreateOutcome::AlreadyExists => info!(crd = %name, "CustomResourceDefinition already exists"),
    }
    Ok(outcome)
}
