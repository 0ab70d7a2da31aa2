//! Broker-backed transports.
//!
//! The [`Transport`](rensv_events::Transport) contract lives in
//! `rensv-events` together with the in-memory implementation used by tests.
//! This module provides the Redis-backed implementation.

#[cfg(feature = "redis")]
pub mod redis_queue;

#[cfg(feature = "redis")]
pub use redis_queue::{RedisQueueError, RedisQueueTransport};
