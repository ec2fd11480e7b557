//! Custom resource types served under the `ray.io` group.

pub mod ray;

/// API group of every custom resource in this workspace.
pub const GROUP: &str = "ray.io";
/// Served (and stored) version.
pub const VERSION: &str = "v1";
