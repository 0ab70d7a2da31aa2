//! Retry/backoff/requeue protocol.
//!
//! ## Design
//!
//! - One sequential consumption path: receive → decode → apply
//! - Failed tasks are re-encoded with `failedCount + 1` and republished after
//!   `unit * base^failedCount`
//! - Tasks past the retry budget are dropped (logged, never republished)
//! - Retry timers live in a single capped delay queue, never on the
//!   consumption path
//!
//! ## Components
//!
//! - `RetryPolicy` and the relay policies: budget, backoff, ack timing,
//!   malformed payloads, error classification
//! - `BackoffScheduler`: delayed, fire-and-forget republish
//! - `Relay`: the per-delivery decision and the consumption loop
//! - `RelayStats`: process counters

pub mod policy;
pub mod relay;
pub mod scheduler;
pub mod stats;

pub use policy::{AckMode, ErrorPolicy, MalformedPayloadPolicy, RetryPolicy, ShutdownMode};
pub use relay::{HandleOutcome, Relay, RelayConfig};
pub use scheduler::{
    BackoffScheduler, ScheduleError, ScheduledRetry, SchedulerConfig, SchedulerHandle,
    SchedulerReport, SchedulerTask,
};
pub use stats::{RelayStats, RelayStatsSnapshot};
