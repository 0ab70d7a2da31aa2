//! Relay core: one decision per inbound delivery.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rensv_core::{
    AppliedResource, ApplyError, Applier, CodecError, Task, decode, decode_lenient, encode,
};
use rensv_events::{Delivery, Transport};

use crate::policy::{AckMode, ErrorPolicy, MalformedPayloadPolicy, RetryPolicy};
use crate::scheduler::SchedulerHandle;
use crate::stats::{RelayStats, RelayStatsSnapshot};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Name for logging.
    pub name: String,
    pub retry: RetryPolicy,
    pub ack_mode: AckMode,
    pub on_malformed: MalformedPayloadPolicy,
    pub error_policy: ErrorPolicy,
    /// Pause after a failed receive before trying again.
    pub receive_error_backoff: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            name: "rensv-relay".to_string(),
            retry: RetryPolicy::default(),
            ack_mode: AckMode::OnReceipt,
            on_malformed: MalformedPayloadPolicy::Reject,
            error_policy: ErrorPolicy::RetryAll,
            receive_error_backoff: Duration::from_secs(1),
        }
    }
}

impl RelayConfig {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_ack_mode(mut self, ack_mode: AckMode) -> Self {
        self.ack_mode = ack_mode;
        self
    }

    pub fn with_malformed_policy(mut self, policy: MalformedPayloadPolicy) -> Self {
        self.on_malformed = policy;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }
}

/// What became of one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The downstream resource was created.
    Applied { resource: AppliedResource },
    /// Apply failed; a republish with `failedCount = attempt` is pending.
    RetryScheduled { attempt: u32, delay: Duration },
    /// Apply failed and the retry budget is spent; the task is dropped.
    Exhausted { failed_count: u32, error: ApplyError },
    /// The payload did not decode and was dropped.
    Rejected { error: CodecError },
    /// A permanent apply failure dropped under `ErrorPolicy::SkipPermanent`.
    Skipped { error: ApplyError },
    /// Apply failed but the retry could not be scheduled; the task is dropped.
    RetryRefused { reason: String },
}

impl HandleOutcome {
    /// Whether the task is gone for good without having been applied.
    pub fn is_drop(&self) -> bool {
        matches!(
            self,
            Self::Exhausted { .. } | Self::Rejected { .. } | Self::Skipped { .. } | Self::RetryRefused { .. }
        )
    }
}

/// Translates queue deliveries into downstream apply calls.
///
/// - Deliveries are handled strictly one at a time; the apply call is awaited
///   inline
/// - Failed tasks go to the [`BackoffScheduler`](crate::BackoffScheduler)
///   through a non-blocking handle
/// - No cross-message state: the only shared data are counters
pub struct Relay<T, A>
where
    T: Transport,
    A: Applier,
{
    transport: Arc<T>,
    applier: Arc<A>,
    scheduler: SchedulerHandle,
    config: RelayConfig,
    stats: Arc<RelayStats>,
}

impl<T, A> Relay<T, A>
where
    T: Transport,
    A: Applier,
{
    pub fn new(
        transport: Arc<T>,
        applier: Arc<A>,
        scheduler: SchedulerHandle,
        config: RelayConfig,
    ) -> Self {
        Self {
            transport,
            applier,
            scheduler,
            config,
            stats: Arc::new(RelayStats::new()),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn stats(&self) -> RelayStatsSnapshot {
        self.stats.snapshot()
    }

    /// Consume deliveries until the transport stream ends or `shutdown` fires.
    ///
    /// A delivery already being handled is finished before the loop stops.
    /// Receive errors are logged and never end the loop.
    pub async fn run(&self, shutdown: CancellationToken) -> RelayStatsSnapshot {
        info!(relay = %self.config.name, ack_mode = ?self.config.ack_mode, "waiting for messages");

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(relay = %self.config.name, "shutdown requested; stopping intake");
                    break;
                }
                received = self.transport.receive() => received,
            };

            match received {
                Ok(Some(delivery)) => {
                    self.handle(delivery).await;
                }
                Ok(None) => {
                    info!(relay = %self.config.name, "transport stream ended");
                    break;
                }
                Err(e) => {
                    error!(relay = %self.config.name, error = %e, "failed to receive delivery");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.receive_error_backoff) => {}
                    }
                }
            }
        }

        let stats = self.stats.snapshot();
        info!(relay = %self.config.name, ?stats, "relay stopped");
        stats
    }

    /// Decide the fate of one delivery.
    pub async fn handle(&self, delivery: Delivery) -> HandleOutcome {
        self.stats.record_received();

        if self.config.ack_mode == AckMode::OnReceipt {
            self.acknowledge(&delivery).await;
        }

        let outcome = self.process(&delivery).await;

        if self.config.ack_mode == AckMode::AfterHandling {
            self.acknowledge(&delivery).await;
        }

        self.stats.record_outcome(&outcome);
        outcome
    }

    async fn process(&self, delivery: &Delivery) -> HandleOutcome {
        let delivery_id = delivery.id();
        info!(%delivery_id, payload = %delivery.payload_lossy(), "received a message");

        let task = match decode(delivery.payload()) {
            Ok(task) => task,
            Err(error) => match self.config.on_malformed {
                MalformedPayloadPolicy::Reject => {
                    warn!(%delivery_id, %error, payload = %delivery.payload_lossy(), "rejecting malformed payload");
                    return HandleOutcome::Rejected { error };
                }
                MalformedPayloadPolicy::ProceedWithDefaults => {
                    let task = decode_lenient(delivery.payload());
                    warn!(
                        %delivery_id,
                        %error,
                        failed_count = task.failed_count,
                        "malformed payload; proceeding with the fields that parsed"
                    );
                    task
                }
            },
        };

        match self.applier.apply(&task).await {
            Ok(resource) => {
                info!(
                    %delivery_id,
                    server_name = %task.server_name,
                    namespace = %resource.namespace,
                    uid = resource.uid.as_deref().unwrap_or(""),
                    "object created"
                );
                HandleOutcome::Applied { resource }
            }
            Err(error) => self.on_apply_failure(delivery, task, error),
        }
    }

    fn on_apply_failure(&self, delivery: &Delivery, mut task: Task, error: ApplyError) -> HandleOutcome {
        let delivery_id = delivery.id();
        warn!(
            %delivery_id,
            server_name = %task.server_name,
            failed_count = task.failed_count,
            %error,
            "error while creating object"
        );

        if self.config.error_policy == ErrorPolicy::SkipPermanent && error.is_permanent() {
            warn!(%delivery_id, server_name = %task.server_name, "permanent failure; not retrying");
            return HandleOutcome::Skipped { error };
        }

        if !self.config.retry.should_retry(task.failed_count) {
            error!(
                %delivery_id,
                server_name = %task.server_name,
                failed_count = task.failed_count,
                payload = %delivery.payload_lossy(),
                "failed to apply; retry budget exhausted, dropping task"
            );
            return HandleOutcome::Exhausted {
                failed_count: task.failed_count,
                error,
            };
        }

        let attempt = task.record_failure();
        let delay = self.config.retry.delay_for_attempt(attempt);

        let payload = match encode(&task) {
            Ok(payload) => payload,
            Err(e) => {
                error!(%delivery_id, error = %e, "failed to re-encode task; dropping");
                return HandleOutcome::RetryRefused {
                    reason: e.to_string(),
                };
            }
        };

        match self.scheduler.schedule(payload, attempt, delay) {
            Ok(()) => {
                info!(
                    %delivery_id,
                    server_name = %task.server_name,
                    attempt,
                    delay_secs = delay.as_secs_f64(),
                    "republish scheduled"
                );
                HandleOutcome::RetryScheduled { attempt, delay }
            }
            Err(e) => {
                error!(
                    %delivery_id,
                    server_name = %task.server_name,
                    attempt,
                    error = %e,
                    "could not schedule republish; dropping task"
                );
                HandleOutcome::RetryRefused {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn acknowledge(&self, delivery: &Delivery) {
        if let Err(e) = self.transport.ack(delivery).await {
            warn!(delivery_id = %delivery.id(), error = %e, "failed to acknowledge delivery");
        } else {
            debug!(delivery_id = %delivery.id(), "delivery acknowledged");
        }
    }
}
