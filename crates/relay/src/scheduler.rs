//! Backoff scheduler: delayed, fire-and-forget republish.
//!
//! All pending retries live in one [`DelayQueue`] owned by a single driver
//! task. Scheduling is a synchronous, non-blocking call on a
//! [`SchedulerHandle`], so the consumption path never waits on a timer. The
//! number of outstanding retries is capped; past the cap `schedule` refuses
//! instead of growing without bound.

use std::collections::HashMap;
use std::future::poll_fn;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::{debug, error, info, warn};

use rensv_events::Transport;

use crate::policy::ShutdownMode;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of retries waiting for their timer (or their publish).
    pub max_pending: usize,
    /// What happens to pending retries on shutdown.
    pub shutdown_mode: ShutdownMode,
    /// Upper bound for one republish; a publish exceeding it counts as failed.
    pub publish_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_pending: 10_000,
            shutdown_mode: ShutdownMode::Drain,
            publish_timeout: Duration::from_secs(30),
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub fn with_shutdown_mode(mut self, mode: ShutdownMode) -> Self {
        self.shutdown_mode = mode;
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }
}

/// A republish waiting for its delay to elapse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRetry {
    /// Re-encoded task, already carrying the incremented `failedCount`.
    pub payload: Vec<u8>,
    pub attempt: u32,
    pub delay: Duration,
    pub scheduled_at: DateTime<Utc>,
}

impl ScheduledRetry {
    pub fn due_at(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.delay)
            .ok()
            .and_then(|delay| self.scheduled_at.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("{pending} retries already pending (capacity {capacity})")]
    Saturated { pending: usize, capacity: usize },

    #[error("scheduler is shut down")]
    Closed,
}

/// Outcome of a scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub published: u64,
    pub publish_failures: u64,
    /// Retries still pending when the scheduler stopped (`ShutdownMode::Abandon`).
    pub abandoned: Vec<ScheduledRetry>,
}

/// Cheap, cloneable entry point used by the relay.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<ScheduledRetry>,
    pending: Arc<AtomicUsize>,
    capacity: usize,
}

impl SchedulerHandle {
    /// Schedule one republish of `payload` after `delay`.
    ///
    /// Never blocks and never waits: the retry is handed to the driver task or
    /// refused right away.
    pub fn schedule(
        &self,
        payload: Vec<u8>,
        attempt: u32,
        delay: Duration,
    ) -> Result<(), ScheduleError> {
        let capacity = self.capacity;
        self.pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < capacity).then_some(n + 1)
            })
            .map_err(|pending| ScheduleError::Saturated { pending, capacity })?;

        let retry = ScheduledRetry {
            payload,
            attempt,
            delay,
            scheduled_at: Utc::now(),
        };

        if self.tx.send(retry).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(ScheduleError::Closed);
        }

        Ok(())
    }

    /// Retries accepted but not yet published.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

}

/// Handle to join a running scheduler.
#[derive(Debug)]
pub struct SchedulerTask {
    join: JoinHandle<SchedulerReport>,
}

impl SchedulerTask {
    /// Wait for the driver to stop.
    ///
    /// The driver stops once shutdown is requested (after draining, in
    /// `ShutdownMode::Drain`), or once every [`SchedulerHandle`] is dropped and
    /// no retry is pending.
    pub async fn join(self) -> SchedulerReport {
        match self.join.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "backoff scheduler task failed");
                SchedulerReport::default()
            }
        }
    }
}

/// Delay-queue driver.
///
/// Due retries are published from their own tasks, so a slow publish never
/// holds up another timer or the shutdown signal.
pub struct BackoffScheduler<T: Transport> {
    transport: Arc<T>,
    config: SchedulerConfig,
    rx: mpsc::UnboundedReceiver<ScheduledRetry>,
    pending: Arc<AtomicUsize>,
    timers: DelayQueue<u64>,
    entries: HashMap<u64, ScheduledRetry>,
    in_flight: HashMap<u64, ScheduledRetry>,
    publishes: JoinSet<(u64, Result<(), String>)>,
    next_id: u64,
    report: SchedulerReport,
}

impl<T: Transport + 'static> BackoffScheduler<T> {
    /// Spawn the driver on the current tokio runtime.
    pub fn spawn(
        transport: Arc<T>,
        config: SchedulerConfig,
        shutdown: CancellationToken,
    ) -> (SchedulerHandle, SchedulerTask) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));

        let handle = SchedulerHandle {
            tx,
            pending: Arc::clone(&pending),
            capacity: config.max_pending,
        };

        let driver = Self {
            transport,
            config,
            rx,
            pending,
            timers: DelayQueue::new(),
            entries: HashMap::new(),
            in_flight: HashMap::new(),
            publishes: JoinSet::new(),
            next_id: 0,
            report: SchedulerReport::default(),
        };

        let join = tokio::spawn(driver.run(shutdown));

        (handle, SchedulerTask { join })
    }

    async fn run(mut self, shutdown: CancellationToken) -> SchedulerReport {
        info!(
            max_pending = self.config.max_pending,
            shutdown_mode = ?self.config.shutdown_mode,
            publish_timeout_ms = self.config.publish_timeout.as_millis() as u64,
            "backoff scheduler started"
        );

        let mut accepting = true;
        let mut intake_open = true;

        loop {
            if !intake_open && self.entries.is_empty() && self.publishes.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = shutdown.cancelled(), if accepting => {
                    accepting = false;
                    self.rx.close();
                    if self.config.shutdown_mode == ShutdownMode::Abandon {
                        break;
                    }
                    info!(
                        pending = self.entries.len(),
                        in_flight = self.in_flight.len(),
                        "draining pending retries"
                    );
                }

                Some(joined) = self.publishes.join_next(), if !self.publishes.is_empty() => {
                    match joined {
                        Ok((id, result)) => self.settle(id, result),
                        Err(e) => error!(error = %e, "republish task failed"),
                    }
                }

                received = self.rx.recv(), if intake_open => match received {
                    Some(retry) => self.insert(retry),
                    None => intake_open = false,
                },

                Some(expired) = poll_fn(|cx| self.timers.poll_expired(cx)), if !self.entries.is_empty() => {
                    self.fire(expired.into_inner());
                }
            }
        }

        self.abandon_remaining().await;

        info!(
            published = self.report.published,
            publish_failures = self.report.publish_failures,
            abandoned = self.report.abandoned.len(),
            "backoff scheduler stopped"
        );

        self.report
    }

    fn insert(&mut self, retry: ScheduledRetry) {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        debug!(attempt = retry.attempt, delay_ms = retry.delay.as_millis() as u64, "retry timer armed");

        self.timers.insert(id, retry.delay);
        self.entries.insert(id, retry);
    }

    /// Start the publish of a due retry.
    fn fire(&mut self, id: u64) {
        let Some(retry) = self.entries.remove(&id) else {
            return;
        };

        let transport = Arc::clone(&self.transport);
        let payload = retry.payload.clone();
        let limit = self.config.publish_timeout;
        self.in_flight.insert(id, retry);

        self.publishes.spawn(async move {
            let result = match tokio::time::timeout(limit, transport.publish(payload)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("publish timed out after {limit:?}")),
            };
            (id, result)
        });
    }

    /// Record a finished publish and release its capacity slot.
    fn settle(&mut self, id: u64, result: Result<(), String>) {
        let Some(retry) = self.in_flight.remove(&id) else {
            return;
        };
        self.pending.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(()) => {
                self.report.published += 1;
                info!(
                    attempt = retry.attempt,
                    payload = %String::from_utf8_lossy(&retry.payload),
                    "republished task"
                );
            }
            Err(error) => {
                self.report.publish_failures += 1;
                error!(
                    attempt = retry.attempt,
                    %error,
                    payload = %String::from_utf8_lossy(&retry.payload),
                    "failed to republish task; giving up"
                );
            }
        }
    }

    async fn abandon_remaining(&mut self) {
        // Publishes that already finished still count; the rest are cut off.
        self.publishes.abort_all();
        while let Some(joined) = self.publishes.join_next().await {
            if let Ok((id, result)) = joined {
                self.settle(id, result);
            }
        }

        let mut abandoned: Vec<ScheduledRetry> = self
            .entries
            .drain()
            .chain(self.in_flight.drain())
            .map(|(_, r)| r)
            .collect();
        while let Ok(retry) = self.rx.try_recv() {
            abandoned.push(retry);
        }
        self.timers.clear();
        abandoned.sort_by_key(ScheduledRetry::due_at);

        for retry in &abandoned {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            warn!(
                attempt = retry.attempt,
                due_at = %retry.due_at(),
                payload = %String::from_utf8_lossy(&retry.payload),
                "abandoning pending retry"
            );
        }

        self.report.abandoned.extend(abandoned);
    }
}
