//! In-memory transport for tests/dev.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::delivery::Delivery;
use crate::transport::Transport;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum InMemoryTransportError {
    /// The inbound stream was closed.
    #[error("transport closed")]
    Closed,

    /// Publish failure injected through [`InMemoryTransport::fail_publishes`].
    #[error("publish rejected")]
    PublishRejected,

    /// Internal lock poisoning.
    #[error("transport state poisoned")]
    Poisoned,
}

/// A payload observed by [`InMemoryTransport::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub payload: Vec<u8>,
    pub at: Instant,
}

/// In-memory queue.
///
/// - No IO; time stamps follow tokio's clock, so paused-time tests see exact
///   delays
/// - In loopback mode published payloads are fed back into the inbound stream,
///   like a broker queue the relay both consumes and republishes to
/// - Every publish and ack is recorded for inspection
#[derive(Debug)]
pub struct InMemoryTransport {
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>,
    loopback: bool,
    fail_publish: AtomicBool,
    published: Mutex<Vec<PublishedMessage>>,
    acked: Mutex<Vec<Uuid>>,
}

impl InMemoryTransport {
    /// Loopback transport: publishes are redelivered.
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Recording-only transport: publishes are recorded but not redelivered.
    pub fn recording() -> Self {
        Self::build(false)
    }

    fn build(loopback: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inbound_tx: Mutex::new(Some(tx)),
            inbound_rx: tokio::sync::Mutex::new(rx),
            loopback,
            fail_publish: AtomicBool::new(false),
            published: Mutex::new(Vec::new()),
            acked: Mutex::new(Vec::new()),
        }
    }

    /// Enqueue an inbound payload (not recorded as a publish).
    pub fn inject(&self, payload: impl Into<Vec<u8>>) -> Result<Uuid, InMemoryTransportError> {
        let delivery = Delivery::new(payload);
        let id = delivery.id();
        self.send_inbound(delivery)?;
        Ok(id)
    }

    /// End the inbound stream once the queued deliveries are drained.
    pub fn close(&self) {
        if let Ok(mut tx) = self.inbound_tx.lock() {
            tx.take();
        }
    }

    /// Make subsequent publishes fail (or succeed again).
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn acked(&self) -> Vec<Uuid> {
        self.acked.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn send_inbound(&self, delivery: Delivery) -> Result<(), InMemoryTransportError> {
        let tx = self
            .inbound_tx
            .lock()
            .map_err(|_| InMemoryTransportError::Poisoned)?;

        match tx.as_ref() {
            Some(tx) => tx
                .send(delivery)
                .map_err(|_| InMemoryTransportError::Closed),
            None => Err(InMemoryTransportError::Closed),
        }
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    type Error = InMemoryTransportError;

    async fn receive(&self) -> Result<Option<Delivery>, Self::Error> {
        let mut rx = self.inbound_rx.lock().await;
        Ok(rx.recv().await)
    }

    async fn publish(&self, payload: Vec<u8>) -> Result<(), Self::Error> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(InMemoryTransportError::PublishRejected);
        }

        if self.loopback {
            self.send_inbound(Delivery::new(payload.clone()))?;
        }

        self.published
            .lock()
            .map_err(|_| InMemoryTransportError::Poisoned)?
            .push(PublishedMessage {
                payload,
                at: Instant::now(),
            });

        Ok(())
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), Self::Error> {
        self.acked
            .lock()
            .map_err(|_| InMemoryTransportError::Poisoned)?
            .push(delivery.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn injected_payloads_are_received_in_order() {
        let transport = InMemoryTransport::new();
        let first = transport.inject(b"one".to_vec()).unwrap();
        transport.inject(b"two".to_vec()).unwrap();

        let d1 = transport.receive().await.unwrap().unwrap();
        let d2 = transport.receive().await.unwrap().unwrap();

        assert_eq!(d1.id(), first);
        assert_eq!(d1.payload(), b"one");
        assert_eq!(d2.payload(), b"two");
    }

    #[tokio::test]
    async fn loopback_publish_is_redelivered_and_recorded() {
        let transport = InMemoryTransport::new();
        transport.publish(b"again".to_vec()).await.unwrap();

        let delivery = transport.receive().await.unwrap().unwrap();
        assert_eq!(delivery.payload(), b"again");
        assert_eq!(transport.published().len(), 1);
    }

    #[tokio::test]
    async fn recording_publish_is_not_redelivered() {
        let transport = InMemoryTransport::recording();
        transport.publish(b"again".to_vec()).await.unwrap();
        transport.close();

        assert!(transport.receive().await.unwrap().is_none());
        assert_eq!(transport.published()[0].payload, b"again".to_vec());
    }

    #[tokio::test]
    async fn close_ends_stream_after_queued_deliveries() {
        let transport = InMemoryTransport::new();
        transport.inject(b"last".to_vec()).unwrap();
        transport.close();

        assert!(transport.receive().await.unwrap().is_some());
        assert!(transport.receive().await.unwrap().is_none());
        assert_eq!(
            transport.inject(b"late".to_vec()),
            Err(InMemoryTransportError::Closed)
        );
    }

    #[tokio::test]
    async fn injected_publish_failures() {
        let transport = InMemoryTransport::recording();
        transport.fail_publishes(true);

        assert_eq!(
            transport.publish(b"x".to_vec()).await,
            Err(InMemoryTransportError::PublishRejected)
        );
        assert!(transport.published().is_empty());

        transport.fail_publishes(false);
        transport.publish(b"x".to_vec()).await.unwrap();
        assert_eq!(transport.published().len(), 1);
    }

    #[tokio::test]
    async fn ack_records_delivery_ids() {
        let transport = InMemoryTransport::new();
        transport.inject(b"x".to_vec()).unwrap();
        let delivery = transport.receive().await.unwrap().unwrap();

        transport.ack(&delivery).await.unwrap();
        assert_eq!(transport.acked(), vec![delivery.id()]);
    }
}
