//! Downstream apply contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::Task;

/// A resource observed after a successful apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedResource {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

impl AppliedResource {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            uid: None,
            resource_version: None,
        }
    }
}

/// Downstream apply failure.
///
/// The variants classify failures so callers *can* treat permanent and
/// transient errors differently; the relay's default policy retries all of
/// them alike.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// Connectivity failure or timeout before a response was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// A resource with the same name already exists.
    #[error("resource {name} already exists")]
    Conflict { name: String },

    /// The request was refused (validation, authorization, ...).
    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The server failed to process the request.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// The response could not be read.
    #[error("unreadable response: {0}")]
    Decode(String),
}

impl ApplyError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Whether retrying the same request can never succeed on its own.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Rejected { .. })
    }
}

/// Realizes a task downstream.
///
/// The relay awaits every call inline on its consumption path, so a slow
/// downstream delays the next delivery. Implementations must be safe to share
/// across tasks.
#[async_trait]
pub trait Applier: Send + Sync {
    async fn apply(&self, task: &Task) -> Result<AppliedResource, ApplyError>;
}

#[async_trait]
impl<A> Applier for std::sync::Arc<A>
where
    A: Applier + ?Sized,
{
    async fn apply(&self, task: &Task) -> Result<AppliedResource, ApplyError> {
        (**self).apply(task).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_and_rejection_are_permanent() {
        assert!(ApplyError::Conflict { name: "srv".into() }.is_permanent());
        assert!(
            ApplyError::Rejected {
                status: 422,
                message: "invalid".into()
            }
            .is_permanent()
        );
    }

    #[test]
    fn transport_and_server_errors_are_transient() {
        assert!(!ApplyError::transport("connection refused").is_permanent());
        assert!(
            !ApplyError::Server {
                status: 503,
                message: "unavailable".into()
            }
            .is_permanent()
        );
        assert!(!ApplyError::Decode("eof".into()).is_permanent());
    }
}
