//! Relay runtime counters.
//!
//! Counters are observational only; no handling decision reads them.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::relay::HandleOutcome;

#[derive(Debug, Default)]
pub struct RelayStats {
    received: AtomicU64,
    applied: AtomicU64,
    retries_scheduled: AtomicU64,
    exhausted: AtomicU64,
    rejected: AtomicU64,
    skipped: AtomicU64,
    retries_refused: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayStatsSnapshot {
    pub received: u64,
    pub applied: u64,
    pub retries_scheduled: u64,
    pub exhausted: u64,
    pub rejected: u64,
    pub skipped: u64,
    pub retries_refused: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: &HandleOutcome) {
        let counter = match outcome {
            HandleOutcome::Applied { .. } => &self.applied,
            HandleOutcome::RetryScheduled { .. } => &self.retries_scheduled,
            HandleOutcome::Exhausted { .. } => &self.exhausted,
            HandleOutcome::Rejected { .. } => &self.rejected,
            HandleOutcome::Skipped { .. } => &self.skipped,
            HandleOutcome::RetryRefused { .. } => &self.retries_refused,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            retries_refused: self.retries_refused.load(Ordering::Relaxed),
        }
    }
}
