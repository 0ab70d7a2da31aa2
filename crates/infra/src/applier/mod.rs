//! Kubernetes-backed [`Applier`](rensv_core::Applier).
//!
//! Each task becomes one namespaced custom resource, created with a plain
//! REST `POST` against the API server.

pub mod in_cluster;
pub mod kubernetes;
pub mod resource;

pub use in_cluster::InClusterConfig;
pub use kubernetes::{ClientBuildError, KubeApplier, KubeConfig};
pub use resource::{ObjectMeta, Rensv, RensvSpec};
