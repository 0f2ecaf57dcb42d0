use crate::amqp::ObservationConsumerService;
use crate::domain::ObservationService;
use anyhow::Context;
use common::amqp::{AmqpConsumer, AmqpSubscriber};
use common::domain::{DomainError, ObservationRepository};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct ObservationAggregatorConfig {
    /// Requeue deliveries that fail to decode or store instead of dropping them
    pub requeue_rejected: bool,
}

/// Wires the subscriber, the dispatch pipeline and the sink together and drives
/// the start/stop sequence.
pub struct ObservationAggregator {
    subscriber: AmqpSubscriber,
    service: Arc<ObservationService>,
    config: ObservationAggregatorConfig,
}

impl ObservationAggregator {
    pub fn new(
        subscriber: AmqpSubscriber,
        repository: Arc<dyn ObservationRepository>,
        config: ObservationAggregatorConfig,
    ) -> Self {
        Self {
            subscriber,
            service: Arc::new(ObservationService::new(repository)),
            config,
        }
    }

    /// Subscribe, drain deliveries until `ctx` is cancelled, then tear down.
    ///
    /// Shutdown order: cancel the consumer, wait for the worker to finish the
    /// delivery in flight, delete the queue, close the connection. The same
    /// teardown runs if the broker closes the delivery stream first, in which
    /// case an error is returned. Cancelling `ctx` before the subscription is
    /// established releases the connection and returns `Ok`.
    pub async fn run(mut self, ctx: CancellationToken) -> anyhow::Result<()> {
        let deliveries = match self.subscriber.subscribe(&ctx).await {
            Ok(deliveries) => deliveries,
            Err(DomainError::SubscribeCancelled) => {
                info!("shutdown requested before subscription was established");
                self.subscriber
                    .shutdown()
                    .await
                    .context("observation aggregator teardown failed")?;
                return Ok(());
            }
            Err(e) => {
                error!(error = %e, "failed to subscribe");
                if let Err(teardown) = self.subscriber.shutdown().await {
                    warn!(error = %teardown, "teardown after failed subscribe did not complete");
                }
                return Err(e).context("observation subscription could not be established");
            }
        };

        let consumer = AmqpConsumer::new(
            deliveries,
            self.subscriber.consumer_tag(),
            self.config.requeue_rejected,
            ObservationConsumerService::new(Arc::clone(&self.service)),
        );
        let mut worker = tokio::spawn(consumer.run());
        info!(consumer_tag = %self.subscriber.consumer_tag(), "observation aggregator running");

        let closed_early = tokio::select! {
            _ = ctx.cancelled() => None,
            joined = &mut worker => Some(joined),
        };

        let mut cancel_failure = None;
        let stream_closed_early = match closed_early {
            None => {
                info!("shutdown requested, stopping consumer");
                if let Err(e) = self.subscriber.cancel_consumer().await {
                    // Closing the connection ends the stream after the delivery in flight
                    error!(error = %e, "failed to cancel consumer, closing connection");
                    if let Err(close) = self.subscriber.close_connection().await {
                        error!(error = %close, "failed to close connection, aborting worker");
                        worker.abort();
                    }
                    cancel_failure = Some(e);
                }
                match worker.await {
                    Ok(stats) => info!(
                        acked = stats.acked,
                        rejected = stats.rejected,
                        "consumer drained"
                    ),
                    Err(e) if e.is_cancelled() => warn!("consumer worker aborted"),
                    Err(e) => error!(error = %e, "consumer worker panicked"),
                }
                false
            }
            Some(joined) => {
                match joined {
                    Ok(stats) => warn!(
                        acked = stats.acked,
                        rejected = stats.rejected,
                        "delivery stream closed before shutdown was requested"
                    ),
                    Err(e) => error!(error = %e, "consumer worker panicked"),
                }
                true
            }
        };

        if let Some(e) = cancel_failure {
            return Err(e).context("observation consumer could not be cancelled");
        }

        let teardown = self.subscriber.shutdown().await;

        if stream_closed_early {
            if let Err(e) = teardown {
                error!(error = %e, "teardown failed after delivery stream closed");
            }
            anyhow::bail!("delivery stream closed unexpectedly");
        }

        teardown.context("observation aggregator teardown failed")?;
        info!("observation aggregator stopped");
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(
                CancellationToken,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
            > + Send,
    > {
        Box::new(move |ctx| Box::pin(async move { self.run(ctx).await }))
    }
}
