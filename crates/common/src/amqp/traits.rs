use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;

/// Lazy, unbounded sequence of raw deliveries. Ends when the consumer is cancelled
/// or the channel is closed.
pub type DeliveryStream = BoxStream<'static, Result<AmqpDelivery>>;

/// Queue declaration flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    pub durable: bool,
    pub auto_delete: bool,
    pub exclusive: bool,
}

impl QueueOptions {
    /// Non-durable, auto-delete, not exclusive: the queue lives only as long as its consumers.
    pub fn ephemeral() -> Self {
        Self {
            durable: false,
            auto_delete: true,
            exclusive: false,
        }
    }
}

/// A raw delivery together with the handle used to settle it on the broker
pub struct AmqpDelivery {
    pub routing_key: String,
    pub exchange: String,
    pub payload: Bytes,
    pub redelivered: bool,
    acker: Arc<dyn DeliveryAcker>,
}

impl AmqpDelivery {
    pub fn new(
        routing_key: String,
        exchange: String,
        payload: Bytes,
        redelivered: bool,
        acker: Arc<dyn DeliveryAcker>,
    ) -> Self {
        Self {
            routing_key,
            exchange,
            payload,
            redelivered,
            acker,
        }
    }

    pub async fn ack(&self) -> Result<()> {
        self.acker.ack().await
    }

    pub async fn nack(&self, requeue: bool) -> Result<()> {
        self.acker.nack(requeue).await
    }
}

impl fmt::Debug for AmqpDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpDelivery")
            .field("routing_key", &self.routing_key)
            .field("exchange", &self.exchange)
            .field("payload_bytes", &self.payload.len())
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

/// Trait for settling a single delivery
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    async fn ack(&self) -> Result<()>;

    /// Reject the delivery; `requeue` hands it back to the broker for redelivery
    async fn nack(&self, requeue: bool) -> Result<()>;
}

/// Trait for establishing broker connections
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AmqpConnector: Send + Sync {
    /// Dial the broker, over TLS when `tls` is set
    async fn dial(&self, dsn: &str, tls: bool) -> Result<Box<dyn AmqpConnection>>;
}

/// Trait for an open broker connection
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AmqpConnection: Send + Sync {
    async fn create_channel(&self) -> Result<Box<dyn AmqpChannel>>;

    async fn close(&self) -> Result<()>;
}

/// Trait for the channel operations used by a subscription
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AmqpChannel: Send + Sync {
    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<()>;

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()>;

    /// Start a manual-ack consumer on the queue
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream>;

    async fn cancel_consumer(&self, consumer_tag: &str) -> Result<()>;

    /// Delete the queue; with `if_unused` the broker refuses while consumers remain
    async fn delete_queue(&self, queue: &str, if_unused: bool) -> Result<()>;
}
