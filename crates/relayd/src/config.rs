//! Command-line and environment configuration.
//!
//! Every flag falls back to the environment variable named after the
//! upper-cased flag (`--max-retries` ↔ `MAX_RETRIES`); a flag given on the
//! command line wins.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use url::Url;

use rensv_infra::KubeConfig;
use rensv_observability::LogFormat;
use rensv_relay::{
    AckMode, ErrorPolicy, MalformedPayloadPolicy, RelayConfig, RetryPolicy, SchedulerConfig,
    ShutdownMode,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid virtual host {0:?}: expected \"/\" or a database number")]
    VirtualHost(String),

    #[error("invalid transport host {0:?}")]
    Host(String),

    #[error("invalid API server URL {url:?}: {reason}")]
    ApiServer { url: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Redis list queue.
    Redis,
    /// Process-local loopback queue fed from stdin.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AckModeArg {
    OnReceipt,
    AfterHandling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MalformedArg {
    Reject,
    Proceed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ErrorPolicyArg {
    RetryAll,
    SkipPermanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShutdownModeArg {
    Drain,
    Abandon,
}

impl From<AckModeArg> for AckMode {
    fn from(arg: AckModeArg) -> Self {
        match arg {
            AckModeArg::OnReceipt => AckMode::OnReceipt,
            AckModeArg::AfterHandling => AckMode::AfterHandling,
        }
    }
}

impl From<MalformedArg> for MalformedPayloadPolicy {
    fn from(arg: MalformedArg) -> Self {
        match arg {
            MalformedArg::Reject => MalformedPayloadPolicy::Reject,
            MalformedArg::Proceed => MalformedPayloadPolicy::ProceedWithDefaults,
        }
    }
}

impl From<ErrorPolicyArg> for ErrorPolicy {
    fn from(arg: ErrorPolicyArg) -> Self {
        match arg {
            ErrorPolicyArg::RetryAll => ErrorPolicy::RetryAll,
            ErrorPolicyArg::SkipPermanent => ErrorPolicy::SkipPermanent,
        }
    }
}

impl From<ShutdownModeArg> for ShutdownMode {
    fn from(arg: ShutdownModeArg) -> Self {
        match arg {
            ShutdownModeArg::Drain => ShutdownMode::Drain,
            ShutdownModeArg::Abandon => ShutdownMode::Abandon,
        }
    }
}

/// CLI entry point
#[derive(Parser, Debug, Clone)]
#[command(name = "rensv-relay")]
#[command(about = "Relays virtual-server tasks from a queue into Kubernetes resources")]
#[command(after_help = "\
Every flag can also be set through the environment variable shown next to it.
USERNAME and HOST are often already set by the login shell (your login name,
the machine's hostname); pass --username/--host explicitly or unset them when
running outside a container. The resolved transport host is logged at startup.")]
pub struct Cli {
    /// Transport user name (login shells often export USERNAME)
    #[arg(long, env = "USERNAME", default_value = "")]
    pub username: String,

    /// Transport password
    #[arg(long, env = "PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Transport host (some shells export HOST as the machine's hostname)
    #[arg(long, env = "HOST", default_value = "redis")]
    pub host: String,

    /// Transport port
    #[arg(long, env = "PORT", default_value_t = 6379)]
    pub port: u16,

    /// Virtual host; selects the Redis database ("/" is database 0)
    #[arg(long, env = "VIRTUALHOST", default_value = "/")]
    pub virtualhost: String,

    /// Queue name
    #[arg(long, env = "QUEUE", default_value = "rensv")]
    pub queue: String,

    /// Transport backend
    #[arg(long, env = "TRANSPORT", value_enum, default_value_t = TransportKind::Redis)]
    pub transport: TransportKind,

    /// Failures tolerated before a task is dropped
    #[arg(long, env = "MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,

    /// Exponential backoff base
    #[arg(long, env = "BACKOFF_BASE", default_value_t = 2)]
    pub backoff_base: u32,

    /// Backoff time unit in milliseconds
    #[arg(long, env = "BACKOFF_UNIT_MS", default_value_t = 1000)]
    pub backoff_unit_ms: u64,

    /// Upper bound for a single backoff delay, in seconds
    #[arg(long, env = "MAX_BACKOFF_SECS", default_value_t = 3600)]
    pub max_backoff_secs: u64,

    /// Maximum number of scheduled republishes
    #[arg(long, env = "MAX_PENDING_RETRIES", default_value_t = 10_000)]
    pub max_pending_retries: usize,

    /// Upper bound for a single republish, in seconds
    #[arg(long, env = "PUBLISH_TIMEOUT_SECS", default_value_t = 30)]
    pub publish_timeout_secs: u64,

    /// When deliveries are acknowledged
    #[arg(long, env = "ACK_MODE", value_enum, default_value_t = AckModeArg::OnReceipt)]
    pub ack_mode: AckModeArg,

    /// Handling of payloads that fail to decode
    #[arg(long, env = "ON_MALFORMED", value_enum, default_value_t = MalformedArg::Reject)]
    pub on_malformed: MalformedArg,

    /// Whether permanent apply failures are retried
    #[arg(long, env = "ERROR_POLICY", value_enum, default_value_t = ErrorPolicyArg::RetryAll)]
    pub error_policy: ErrorPolicyArg,

    /// What happens to pending republishes on shutdown
    #[arg(long, env = "SHUTDOWN_MODE", value_enum, default_value_t = ShutdownModeArg::Drain)]
    pub shutdown_mode: ShutdownModeArg,

    /// Namespace resources are created in
    #[arg(long, env = "NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Custom resource API group
    #[arg(long, env = "API_GROUP", default_value = "rensv.eccnetlab.io")]
    pub api_group: String,

    /// Custom resource API version
    #[arg(long, env = "API_VERSION", default_value = "v1")]
    pub api_version: String,

    /// Custom resource plural name
    #[arg(long, env = "RESOURCE", default_value = "rensvs")]
    pub resource: String,

    /// API server URL (skips in-cluster discovery)
    #[arg(long, env = "API_SERVER")]
    pub api_server: Option<String>,

    /// Bearer token for --api-server
    #[arg(long, env = "API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Downstream request timeout in seconds
    #[arg(long, env = "APPLY_TIMEOUT_SECS", default_value_t = 30)]
    pub apply_timeout_secs: u64,

    /// Log output format (json or pretty)
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,
}

impl Cli {
    /// Transport connection URI, e.g. `redis://user:pw@redis:6379/0`.
    pub fn uri(&self) -> Result<Url, ConfigError> {
        let database = database_number(&self.virtualhost)?;

        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };

        let mut url = Url::parse(&format!("redis://{host}:{}/{database}", self.port))
            .map_err(|_| ConfigError::Host(self.host.clone()))?;

        if !self.username.is_empty() {
            url.set_username(&self.username)
                .map_err(|_| ConfigError::Host(self.host.clone()))?;
        }
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| ConfigError::Host(self.host.clone()))?;
        }
        Ok(url)
    }

    /// [`Cli::uri`] with the password masked, for logging.
    pub fn redacted_uri(&self) -> Result<Url, ConfigError> {
        let mut url = self.uri()?;
        if url.password().is_some() {
            // Setting a password only fails for URLs without a host.
            let _ = url.set_password(Some("***"));
        }
        Ok(url)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_retries,
            self.backoff_base,
            Duration::from_millis(self.backoff_unit_ms),
        )
        .with_max_delay(Duration::from_secs(self.max_backoff_secs))
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig::default()
            .with_retry(self.retry_policy())
            .with_ack_mode(self.ack_mode.into())
            .with_malformed_policy(self.on_malformed.into())
            .with_error_policy(self.error_policy.into())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default()
            .with_max_pending(self.max_pending_retries)
            .with_shutdown_mode(self.shutdown_mode.into())
            .with_publish_timeout(Duration::from_secs(self.publish_timeout_secs))
    }

    /// Downstream config for an explicit `--api-server`, or `None` when the
    /// in-cluster service account should be used.
    pub fn explicit_kube_config(&self) -> Result<Option<KubeConfig>, ConfigError> {
        let Some(raw) = &self.api_server else {
            return Ok(None);
        };
        let api_server = Url::parse(raw).map_err(|e| ConfigError::ApiServer {
            url: raw.clone(),
            reason: e.to_string(),
        })?;

        let mut config = self.apply_overrides(KubeConfig::new(api_server));
        config.token = self.api_token.clone();
        Ok(Some(config))
    }

    /// Apply the namespace, resource coordinates and timeout flags.
    pub fn apply_overrides(&self, config: KubeConfig) -> KubeConfig {
        let kind = config.kind.clone();
        config
            .with_namespace(&self.namespace)
            .with_api_group(&self.api_group, &self.api_version)
            .with_resource(&self.resource, kind)
            .with_timeout(Duration::from_secs(self.apply_timeout_secs))
    }
}

fn database_number(virtualhost: &str) -> Result<u32, ConfigError> {
    let trimmed = virtualhost.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed
        .parse()
        .map_err(|_| ConfigError::VirtualHost(virtualhost.to_string()))
}
