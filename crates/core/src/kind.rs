use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use crate::apis::ray::Ray;

/// Closed set of resource kinds the operator manages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Pod,
    Ray,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Pod, ResourceKind::Ray];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "Pod",
            ResourceKind::Ray => "Ray",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ResourceKind {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParseKeyError::UnknownKind(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseKeyError {
    #[error("unknown resource kind: {0}")]
    UnknownKind(String),
    #[error("invalid object key: {0} (expect Kind/name or Kind/namespace/name)")]
    Malformed(String),
}

/// Kind-qualified identity of one object, rendered as `Kind/namespace/name`
/// (or `Kind/name` for cluster-scoped objects).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub kind: ResourceKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: ResourceKind, namespace: Option<&str>, name: &str) -> Self {
        Self { kind, namespace: namespace.map(|s| s.to_string()), name: name.to_string() }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

impl FromStr for ObjectKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<_> = s.split('/').collect();
        let (kind, ns, name) = match parts.as_slice() {
            [kind, name] => (*kind, None, *name),
            [kind, ns, name] if !ns.is_empty() => (*kind, Some(*ns), *name),
            _ => return Err(ParseKeyError::Malformed(s.to_string())),
        };
        if name.is_empty() {
            return Err(ParseKeyError::Malformed(s.to_string()));
        }
        Ok(ObjectKey::new(kind.parse()?, ns, name))
    }
}

/// An object of one of the managed kinds as last seen on the API server.
///
/// Cloning yields the immutable snapshot queued for reconciliation; the live
/// copy stays with the watch source.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagedObject {
    Pod(Box<Pod>),
    Ray(Box<Ray>),
}

impl ManagedObject {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ManagedObject::Pod(_) => ResourceKind::Pod,
            ManagedObject::Ray(_) => ResourceKind::Ray,
        }
    }

    pub fn key(&self) -> ObjectKey {
        match self {
            ManagedObject::Pod(p) => ObjectKey { kind: ResourceKind::Pod, namespace: p.namespace(), name: p.name_any() },
            ManagedObject::Ray(r) => ObjectKey { kind: ResourceKind::Ray, namespace: r.namespace(), name: r.name_any() },
        }
    }

    pub fn resource_version(&self) -> Option<&str> {
        match self {
            ManagedObject::Pod(p) => p.metadata.resource_version.as_deref(),
            ManagedObject::Ray(r) => r.metadata.resource_version.as_deref(),
        }
    }

    pub fn as_pod(&self) -> Option<&Pod> {
        match self {
            ManagedObject::Pod(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_ray(&self) -> Option<&Ray> {
        match self {
            ManagedObject::Ray(r) => Some(r),
            _ => None,
        }
    }
}

impl From<Pod> for ManagedObject {
    fn from(p: Pod) -> Self { ManagedObject::Pod(Box::new(p)) }
}

impl From<Ray> for ManagedObject {
    fn from(r: Ray) -> Self { ManagedObject::Ray(Box::new(r)) }
}
