//! The unit of work carried through the queue.

use serde::{Deserialize, Serialize};

/// A request to realize one web server resource downstream.
///
/// ## Retry State
///
/// The task carries its own retry state in `failed_count`; the relay keeps no
/// registry of in-flight tasks. Every republish goes through
/// [`Task::record_failure`], which bumps the counter by exactly one and leaves
/// the identity (`server_name`) untouched.
///
/// ## Wire Names
///
/// Fields are serialized in camelCase (`documentRoot`, `serverName`,
/// `failedCount`) in declaration order, so encoding is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Opaque to the relay, passed through verbatim.
    pub document_root: String,

    /// Free-form data and the name of the downstream resource.
    pub server_name: String,

    /// Number of failed apply attempts so far.
    #[serde(default)]
    pub failed_count: u32,
}

impl Task {
    pub fn new(document_root: impl Into<String>, server_name: impl Into<String>) -> Self {
        Self {
            document_root: document_root.into(),
            server_name: server_name.into(),
            failed_count: 0,
        }
    }

    pub fn with_failed_count(mut self, failed_count: u32) -> Self {
        self.failed_count = failed_count;
        self
    }

    /// Record one more failed attempt and return the new count.
    pub fn record_failure(&mut self) -> u32 {
        self.failed_count = self.failed_count.saturating_add(1);
        self.failed_count
    }
}
