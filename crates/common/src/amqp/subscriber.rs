use crate::amqp::{AmqpChannel, AmqpConnection, AmqpConnector, DeliveryStream, QueueOptions};
use crate::domain::{DomainError, DomainResult, TeardownStep};
use crate::retry::RetryPolicy;
use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_QUEUE_PREFIX: &str = "amqp-observation-aggregator";

/// Settings for a single topic subscription
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub dsn: String,
    pub tls: bool,
    pub exchange: String,
    pub queue_prefix: String,
    pub consumer_tag: String,
    /// Binding patterns, wildcards per broker convention
    pub topics: Vec<String>,
    pub retry_policy: RetryPolicy,
}

impl SubscriberConfig {
    pub fn queue_name(&self) -> String {
        format!("{}-{}", self.queue_prefix, self.consumer_tag)
    }
}

/// Owns the broker connection, channel and queue of one subscription.
///
/// `subscribe` dials once, then runs channel → declare → bind → consume as a
/// single retried unit. `shutdown` tears down in reverse order and can be called
/// any number of times.
pub struct AmqpSubscriber {
    connector: Arc<dyn AmqpConnector>,
    config: SubscriberConfig,
    connection: Option<Box<dyn AmqpConnection>>,
    channel: Option<Box<dyn AmqpChannel>>,
    queue_name: Option<String>,
    consuming: bool,
}

impl AmqpSubscriber {
    pub fn new(connector: Arc<dyn AmqpConnector>, config: SubscriberConfig) -> Self {
        Self {
            connector,
            config,
            connection: None,
            channel: None,
            queue_name: None,
            consuming: false,
        }
    }

    pub fn consumer_tag(&self) -> &str {
        &self.config.consumer_tag
    }

    pub fn is_consuming(&self) -> bool {
        self.consuming
    }

    /// Subscribe to the configured topics and return the raw delivery stream.
    ///
    /// A dial failure is returned immediately as `DialFailure`. Setup failures are
    /// retried under the retry policy and surface as `SetupFailed` once exhausted,
    /// in which case no channel or queue is kept.
    ///
    /// Cancelling `ctx` while dialling or between attempts returns
    /// `SubscribeCancelled`; a connection that was already dialled is kept for
    /// `shutdown`.
    #[instrument(skip_all, fields(consumer_tag = %self.config.consumer_tag))]
    pub async fn subscribe(&mut self, ctx: &CancellationToken) -> DomainResult<DeliveryStream> {
        if self.consuming {
            return Err(DomainError::AlreadySubscribed);
        }

        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(DomainError::SubscribeCancelled),
                dialled = self.connector.dial(&self.config.dsn, self.config.tls) => {
                    dialled.map_err(DomainError::DialFailure)?
                }
            },
        };

        let queue_name = self.config.queue_name();
        let mut backoff = self.config.retry_policy.backoff();

        loop {
            match self.setup(&*connection, &queue_name).await {
                Ok((channel, deliveries)) => {
                    info!(
                        queue = %queue_name,
                        topics = self.config.topics.len(),
                        "subscription established"
                    );
                    self.connection = Some(connection);
                    self.channel = Some(channel);
                    self.queue_name = Some(queue_name);
                    self.consuming = true;
                    return Ok(deliveries);
                }
                Err(e) => match backoff.next_delay() {
                    Some(delay) => {
                        warn!(
                            attempt = backoff.failures(),
                            delay_ms = delay.as_millis(),
                            error = %format!("{:#}", e),
                            "subscription setup failed, retrying"
                        );
                        tokio::select! {
                            biased;
                            _ = ctx.cancelled() => {
                                info!("subscription setup cancelled");
                                // Keep the connection so shutdown can still close it
                                self.connection = Some(connection);
                                return Err(DomainError::SubscribeCancelled);
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    None => {
                        // Keep the connection so shutdown can still close it
                        self.connection = Some(connection);
                        return Err(DomainError::SetupFailed {
                            attempts: backoff.failures(),
                            source: e,
                        });
                    }
                },
            }
        }
    }

    async fn setup(
        &self,
        connection: &dyn AmqpConnection,
        queue_name: &str,
    ) -> anyhow::Result<(Box<dyn AmqpChannel>, DeliveryStream)> {
        let channel = connection
            .create_channel()
            .await
            .context("failed to get channel")?;

        debug!(queue = %queue_name, "declaring queue");
        channel
            .declare_queue(queue_name, QueueOptions::ephemeral())
            .await
            .context("failed to declare queue")?;

        for topic in &self.config.topics {
            debug!(
                queue = %queue_name,
                exchange = %self.config.exchange,
                key = %topic,
                "binding topic to exchange"
            );
            channel
                .bind_queue(queue_name, &self.config.exchange, topic)
                .await
                .context("failed to bind queue")?;
        }

        let deliveries = channel
            .consume(queue_name, &self.config.consumer_tag)
            .await
            .context("failed to consume")?;

        Ok((channel, deliveries))
    }

    /// Cancel the active consumer so the broker stops sending deliveries.
    ///
    /// The delivery stream ends once the broker confirms. No-op when not consuming.
    pub async fn cancel_consumer(&mut self) -> DomainResult<()> {
        if !self.consuming {
            return Ok(());
        }

        if let Some(channel) = self.channel.as_deref() {
            channel
                .cancel_consumer(&self.config.consumer_tag)
                .await
                .map_err(|source| DomainError::TeardownFailure {
                    step: TeardownStep::CancelConsumer,
                    source,
                })?;
        }

        debug!(consumer_tag = %self.config.consumer_tag, "consumer cancelled");
        self.consuming = false;
        Ok(())
    }

    /// Close the connection without cancelling the consumer or deleting the queue.
    ///
    /// Used when the consumer cannot be cancelled: closing the connection ends the
    /// delivery stream, and the broker drops the auto-delete queue once its last
    /// consumer is gone. All subscription state is released, so a later
    /// `shutdown` is a no-op.
    pub async fn close_connection(&mut self) -> DomainResult<()> {
        let Some(connection) = self.connection.as_deref() else {
            return Ok(());
        };

        warn!("closing AMQP connection without consumer cancel");
        connection
            .close()
            .await
            .map_err(|source| DomainError::TeardownFailure {
                step: TeardownStep::CloseConnection,
                source,
            })?;

        self.consuming = false;
        self.queue_name = None;
        self.channel = None;
        self.connection = None;
        Ok(())
    }

    /// Shut the subscription down: cancel consumer → delete queue → close connection.
    ///
    /// Stops at the first failing step and returns it as `TeardownFailure`; steps
    /// already completed are not repeated by a later call.
    pub async fn shutdown(&mut self) -> DomainResult<()> {
        info!("shutting down subscriber");

        if self.connection.is_none() {
            info!("subscriber shutdown OK");
            return Ok(());
        }

        self.cancel_consumer().await?;

        if let (Some(channel), Some(queue)) = (self.channel.as_deref(), self.queue_name.as_deref()) {
            channel
                .delete_queue(queue, true)
                .await
                .map_err(|source| DomainError::TeardownFailure {
                    step: TeardownStep::DeleteQueue,
                    source,
                })?;
            debug!(queue = %queue, "queue deleted");
        }
        self.queue_name = None;
        self.channel = None;

        if let Some(connection) = self.connection.as_deref() {
            connection
                .close()
                .await
                .map_err(|source| DomainError::TeardownFailure {
                    step: TeardownStep::CloseConnection,
                    source,
                })?;
        }
        self.connection = None;

        info!("subscriber shutdown OK");
        Ok(())
    }
}
