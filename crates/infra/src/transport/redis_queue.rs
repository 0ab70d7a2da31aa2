//! Redis list-backed work queue.
//!
//! ## Layout
//!
//! - **Queue key**: `<queue>` (e.g. `rensv`); producers `LPUSH`, the relay
//!   consumes from the tail, so the list is FIFO
//! - **Processing key**: `<queue>:processing`; `BLMOVE` atomically moves each
//!   received payload here, `ack` removes it with `LREM`
//! - **Recovery**: payloads left in the processing list by a crashed consumer
//!   are moved back with [`RedisQueueTransport::recover_in_flight`]
//!
//! Consuming holds a dedicated connection because `BLMOVE` blocks the
//! connection it runs on; publish and ack share a second one.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use rensv_events::{Delivery, Transport};

/// Suffix of the in-flight list key.
const PROCESSING_SUFFIX: &str = ":processing";

/// Server-side block timeout of one `BLMOVE` call.
const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum RedisQueueError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis command error: {0}")]
    Command(String),
}

pub struct RedisQueueTransport {
    queue_key: String,
    processing_key: String,
    block_timeout: Duration,
    consumer: Mutex<MultiplexedConnection>,
    publisher: MultiplexedConnection,
}

impl std::fmt::Debug for RedisQueueTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueueTransport")
            .field("queue_key", &self.queue_key)
            .field("processing_key", &self.processing_key)
            .field("block_timeout", &self.block_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisQueueTransport {
    /// Connect to Redis and bind to `queue`.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g. "redis://user:pw@redis:6379/0")
    /// * `queue` - list key the producers push tasks to
    pub async fn connect(
        redis_url: impl AsRef<str>,
        queue: impl Into<String>,
    ) -> Result<Self, RedisQueueError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisQueueError::Connection(e.to_string()))?;

        let consumer = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| RedisQueueError::Connection(e.to_string()))?;
        let publisher = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| RedisQueueError::Connection(e.to_string()))?;

        let queue_key = queue.into();
        Ok(Self {
            processing_key: processing_key(&queue_key),
            queue_key,
            block_timeout: DEFAULT_BLOCK_TIMEOUT,
            consumer: Mutex::new(consumer),
            publisher,
        })
    }

    pub fn with_block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = timeout;
        self
    }

    pub fn queue_key(&self) -> &str {
        &self.queue_key
    }

    pub fn processing_key(&self) -> &str {
        &self.processing_key
    }

    /// Move every payload left in the processing list back onto the queue.
    ///
    /// The oldest in-flight payload ends up next in line. Returns how many
    /// payloads were moved.
    #[instrument(skip(self), fields(queue = %self.queue_key), err)]
    pub async fn recover_in_flight(&self) -> Result<usize, RedisQueueError> {
        let mut conn = self.publisher.clone();
        let mut recovered = 0;

        loop {
            let moved: Option<Vec<u8>> = redis::cmd("LMOVE")
                .arg(&self.processing_key)
                .arg(&self.queue_key)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await
                .map_err(|e| RedisQueueError::Command(format!("LMOVE failed: {}", e)))?;

            if moved.is_none() {
                break;
            }
            recovered += 1;
        }

        if recovered > 0 {
            info!(recovered, "re-queued in-flight payloads");
        }
        Ok(recovered)
    }

    /// Number of payloads waiting in the queue.
    pub async fn len(&self) -> Result<usize, RedisQueueError> {
        let mut conn = self.publisher.clone();
        let len: usize = redis::cmd("LLEN")
            .arg(&self.queue_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| RedisQueueError::Command(format!("LLEN failed: {}", e)))?;
        Ok(len)
    }
}

#[async_trait]
impl Transport for RedisQueueTransport {
    type Error = RedisQueueError;

    /// Block until a payload is available. The stream never ends.
    async fn receive(&self) -> Result<Option<Delivery>, Self::Error> {
        let mut conn = self.consumer.lock().await;

        loop {
            let payload: Option<Vec<u8>> = redis::cmd("BLMOVE")
                .arg(&self.queue_key)
                .arg(&self.processing_key)
                .arg("RIGHT")
                .arg("LEFT")
                .arg(self.block_timeout.as_secs_f64())
                .query_async(&mut *conn)
                .await
                .map_err(|e| RedisQueueError::Command(format!("BLMOVE failed: {}", e)))?;

            if let Some(payload) = payload {
                let delivery = Delivery::new(payload);
                debug!(queue = %self.queue_key, delivery_id = %delivery.id(), "payload received");
                return Ok(Some(delivery));
            }
        }
    }

    async fn publish(&self, payload: Vec<u8>) -> Result<(), Self::Error> {
        let mut conn = self.publisher.clone();
        let _: u64 = redis::cmd("LPUSH")
            .arg(&self.queue_key)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| RedisQueueError::Command(format!("LPUSH failed: {}", e)))?;
        Ok(())
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), Self::Error> {
        let mut conn = self.publisher.clone();
        let _: u64 = redis::cmd("LREM")
            .arg(&self.processing_key)
            .arg(1)
            .arg(delivery.payload())
            .query_async(&mut conn)
            .await
            .map_err(|e| RedisQueueError::Command(format!("LREM failed: {}", e)))?;
        Ok(())
    }
}

fn processing_key(queue: &str) -> String {
    format!("{queue}{PROCESSING_SUFFIX}")
}
