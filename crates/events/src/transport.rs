//! Queue transport abstraction (mechanics only).
//!
//! The transport is the relay's only window onto the broker. It is
//! intentionally **small** and makes minimal assumptions:
//!
//! - **Broker-agnostic**: works with an in-memory loopback, a Redis list, or
//!   any queue offering receive/publish/ack.
//! - **No ordering guarantees**: a republished task lands wherever the broker
//!   puts it relative to other in-flight messages.
//! - **Explicit acknowledgement**: the relay decides *when* a delivery counts as
//!   consumed (on receipt or after handling); the transport decides *how*.

use std::sync::Arc;

use async_trait::async_trait;

use crate::delivery::Delivery;

/// Domain-agnostic queue transport.
///
/// ## Receive
///
/// `receive()` waits for the next delivery and returns `Ok(None)` once the
/// stream has ended for good (the relay then stops). Implementations that poll
/// should keep polling internally instead of surfacing empty reads; errors are
/// reserved for real failures (connection loss, protocol errors). The relay
/// logs them and keeps consuming.
///
/// ## Publish
///
/// `publish()` enqueues a payload on the same queue the relay consumes. The
/// retry path calls it exactly once per scheduled republish and never retries
/// a failed publish.
///
/// ## Ack
///
/// `ack()` marks a delivery consumed. For transports that remove messages on
/// read it may be a no-op.
///
/// ## Thread Safety
///
/// The trait requires `Send + Sync`: the consumption path and the backoff
/// scheduler use the same transport concurrently.
#[async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn receive(&self) -> Result<Option<Delivery>, Self::Error>;

    async fn publish(&self, payload: Vec<u8>) -> Result<(), Self::Error>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), Self::Error>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    type Error = T::Error;

    async fn receive(&self) -> Result<Option<Delivery>, Self::Error> {
        (**self).receive().await
    }

    async fn publish(&self, payload: Vec<u8>) -> Result<(), Self::Error> {
        (**self).publish(payload).await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), Self::Error> {
        (**self).ack(delivery).await
    }
}
