//! Infrastructure adapters: the Redis list queue and the Kubernetes applier.

pub mod applier;
pub mod transport;

pub use applier::{ClientBuildError, InClusterConfig, KubeApplier, KubeConfig};
#[cfg(feature = "redis")]
pub use transport::{RedisQueueError, RedisQueueTransport};
