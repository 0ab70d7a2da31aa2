//! Retry budget, backoff and the relay's handling policies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry budget and exponential backoff.
///
/// The delay before republish attempt `k` (the post-increment `failedCount`)
/// is `unit * base^k`; with the defaults that is 2, 4, 8, 16 and 32 seconds
/// for attempts 1 through 5.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Failures tolerated before a task is dropped.
    pub max_retries: u32,
    /// Exponential base.
    pub base: u32,
    /// Time unit the exponential is multiplied with.
    pub unit: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base: 2,
            unit: Duration::from_secs(1),
            max_delay: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with exponential backoff and the default delay cap.
    pub fn exponential(max_retries: u32, base: u32, unit: Duration) -> Self {
        Self {
            max_retries,
            base,
            unit,
            ..Default::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before republish attempt `attempt`; overflow saturates to `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base
            .checked_pow(attempt)
            .and_then(|factor| self.unit.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Whether a task that has already failed `failed_count` times may be
    /// retried once more.
    pub fn should_retry(&self, failed_count: u32) -> bool {
        failed_count < self.max_retries
    }
}

/// When a delivery counts as consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AckMode {
    /// Acknowledge before decoding; a crash mid-processing loses the message.
    #[default]
    OnReceipt,
    /// Acknowledge once the outcome is settled (applied, dropped, or
    /// republish scheduled); unacknowledged messages are recovered by the
    /// transport.
    AfterHandling,
}

/// What to do with a payload that does not decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MalformedPayloadPolicy {
    /// Log and drop the delivery.
    #[default]
    Reject,
    /// Apply whatever parsed; missing or mistyped fields are zero-valued and
    /// a parsed `failedCount` is kept.
    ProceedWithDefaults,
}

/// How apply failures are classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Every failure is retried up to the budget.
    #[default]
    RetryAll,
    /// Permanent failures (conflict, rejection) are dropped immediately.
    SkipPermanent,
}

/// What happens to pending retries on shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShutdownMode {
    /// Wait for every pending timer and publish.
    #[default]
    Drain,
    /// Stop immediately; pending retries are logged and reported.
    Abandon,
}
