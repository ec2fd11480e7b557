//! `Ray` custom resource: a Ray cluster made of one head group and one worker group.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired shape of a Ray cluster.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ray.io",
    version = "v1",
    kind = "Ray",
    plural = "rays",
    singular = "ray",
    status = "RayStatus",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Head","type":"integer","jsonPath":".spec.RayHeadSpec.Replicas"}"#,
    printcolumn = r#"{"name":"Workers","type":"integer","jsonPath":".spec.RayWorkerSpec.Replicas"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct RaySpec {
    #[serde(rename = "RayHeadSpec")]
    pub head: RayHeadSpec,
    #[serde(rename = "RayWorkerSpec")]
    pub worker: RayWorkerSpec,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct RayHeadSpec {
    #[serde(rename = "Replicas")]
    pub replicas: i32,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct RayWorkerSpec {
    #[serde(rename = "Replicas")]
    pub replicas: i32,
}

/// Observed state, written back by the Ray controller.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct RayStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<RayCondition>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RayCondition {
    /// Condition type, e.g. `HeadReady`.
    #[serde(rename = "type")]
    pub type_: String,
    /// One of `True`, `False`, `Unknown`.
    pub status: String,
    /// RFC 3339 timestamp of the last probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_probe_time: Option<String>,
    /// RFC 3339 timestamp of the last status transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    /// Unique, one-word, CamelCase reason for the last transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RaySpec {
    pub fn new(head_replicas: i32, worker_replicas: i32) -> Self {
        Self { head: RayHeadSpec { replicas: head_replicas }, worker: RayWorkerSpec { replicas: worker_replicas } }
    }

    /// Total pods the cluster should run (head plus workers).
    pub fn desired_pods(&self) -> i32 {
        self.head.replicas.max(0).saturating_add(self.worker.replicas.max(0))
    }
}
