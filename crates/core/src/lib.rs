//! Ray operator core types: resource kinds, managed objects and the controller contract

#![forbid(unsafe_code)]

pub mod apis;
mod controller;
mod kind;

pub use controller::{Controller, ControllerHandle, ReconcileError, UnitOfWork, WorkFuture};
pub use kind::{ManagedObject, ObjectKey, ParseKeyError, ResourceKind};

pub mod prelude {
    pub use super::apis::ray::{Ray, RaySpec, RayStatus};
    pub use super::{Controller, ControllerHandle, ManagedObject, ObjectKey, ReconcileError, ResourceKind, UnitOfWork};
}
