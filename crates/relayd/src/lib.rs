//! `rensv-relay` daemon: configuration and process wiring.

pub mod app;
pub mod config;

pub use app::{RunSummary, run, serve, wait_for_shutdown_signal};
pub use config::{Cli, ConfigError, TransportKind};
