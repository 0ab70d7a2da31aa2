//! Daemon wiring: build the transport and applier, run the relay until the
//! stream ends or shutdown is requested, then settle pending retries.

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tokio::io::AsyncBufReadExt;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rensv_core::Applier;
use rensv_events::{InMemoryTransport, Transport};
use rensv_infra::{KubeApplier, KubeConfig};
use rensv_relay::{BackoffScheduler, Relay, RelayStatsSnapshot, SchedulerReport};

use crate::config::{Cli, TransportKind};

/// What a finished run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub relay: RelayStatsSnapshot,
    pub republished: u64,
    pub republish_failures: u64,
    pub abandoned: usize,
}

impl RunSummary {
    fn new(relay: RelayStatsSnapshot, report: SchedulerReport) -> Self {
        Self {
            relay,
            republished: report.published,
            republish_failures: report.publish_failures,
            abandoned: report.abandoned.len(),
        }
    }
}

/// Build the downstream applier from `--api-server` or the pod's service account.
pub fn build_applier(cli: &Cli) -> anyhow::Result<KubeApplier> {
    let config = match cli.explicit_kube_config()? {
        Some(config) => config,
        None => {
            let discovered = KubeConfig::in_cluster()
                .context("in-cluster discovery failed; pass --api-server to run outside a cluster")?;
            cli.apply_overrides(discovered)
        }
    };

    info!(
        api_server = %config.api_server,
        namespace = %config.namespace,
        group_version = %config.group_version(),
        resource = %config.resource,
        "downstream configured"
    );
    KubeApplier::new(config).context("failed to build the Kubernetes client")
}

/// Run the daemon until the transport ends or `shutdown` is cancelled.
pub async fn run(cli: Cli, shutdown: CancellationToken) -> anyhow::Result<RunSummary> {
    let applier = Arc::new(build_applier(&cli)?);

    info!(
        transport = ?cli.transport,
        host = %cli.host,
        port = cli.port,
        username = %cli.username,
        queue = %cli.queue,
        "transport settings resolved"
    );

    match cli.transport {
        TransportKind::Redis => run_redis(&cli, applier, shutdown).await,
        TransportKind::Memory => {
            let transport = Arc::new(InMemoryTransport::new());
            spawn_stdin_feeder(transport.clone(), shutdown.clone());
            info!(queue = %cli.queue, "using in-memory transport fed from stdin");
            Ok(serve(&cli, transport, applier, shutdown).await)
        }
    }
}

#[cfg(feature = "redis")]
async fn run_redis<A: Applier + 'static>(
    cli: &Cli,
    applier: Arc<A>,
    shutdown: CancellationToken,
) -> anyhow::Result<RunSummary> {
    use rensv_infra::RedisQueueTransport;

    let uri = cli.uri()?;
    info!(uri = %cli.redacted_uri()?, queue = %cli.queue, "connecting to transport");

    let transport = RedisQueueTransport::connect(uri.as_str(), &cli.queue)
        .await
        .context("failed to connect to the transport")?;
    transport
        .recover_in_flight()
        .await
        .context("failed to recover in-flight deliveries")?;

    Ok(serve(cli, Arc::new(transport), applier, shutdown).await)
}

#[cfg(not(feature = "redis"))]
async fn run_redis<A: Applier + 'static>(
    _cli: &Cli,
    _applier: Arc<A>,
    _shutdown: CancellationToken,
) -> anyhow::Result<RunSummary> {
    anyhow::bail!("this build has no Redis support; use --transport memory")
}

/// Run the relay over `transport` and wait for the scheduler to settle.
pub async fn serve<T, A>(
    cli: &Cli,
    transport: Arc<T>,
    applier: Arc<A>,
    shutdown: CancellationToken,
) -> RunSummary
where
    T: Transport + 'static,
    A: Applier + 'static,
{
    let (scheduler, scheduler_task) =
        BackoffScheduler::spawn(transport.clone(), cli.scheduler_config(), shutdown.clone());
    let relay = Relay::new(transport, applier, scheduler, cli.relay_config());

    let stats = relay.run(shutdown).await;
    // Dropping the relay releases its scheduler handle so the driver can finish.
    drop(relay);
    let report = scheduler_task.join().await;

    let summary = RunSummary::new(stats, report);
    info!(
        received = summary.relay.received,
        applied = summary.relay.applied,
        exhausted = summary.relay.exhausted,
        republished = summary.republished,
        abandoned = summary.abandoned,
        "relay finished"
    );
    summary
}

/// Inject each non-empty stdin line as a delivery; stdin EOF leaves the
/// queue open.
fn spawn_stdin_feeder(transport: Arc<InMemoryTransport>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    if let Err(e) = transport.inject(line.into_bytes()) {
                        warn!(error = %e, "failed to inject stdin payload");
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "failed to read stdin");
                    break;
                }
            }
        }
    });
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
pub async fn wait_for_shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT (Ctrl+C), initiating shutdown"),
        () = terminate => info!("Received SIGTERM, initiating shutdown"),
        () = shutdown.cancelled() => return,
    }

    shutdown.cancel();
}
