use crate::amqp::{AmqpDelivery, ConsumeRequest, ConsumeResponse, DeliveryStream};
use futures::StreamExt;
use std::time::Instant;
use tower::{Service, ServiceExt};
use tracing::{debug, debug_span, error, info, warn, Instrument};

/// Counters collected while draining a delivery stream
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub acked: u64,
    pub rejected: u64,
    pub settle_failures: u64,
}

/// Drains a delivery stream through a Tower service stack, one delivery at a time.
///
/// Every delivery is settled only after the service has finished with it: `Ack`
/// acknowledges, `Nack` (or a service error) rejects. The loop has no cancellation
/// of its own and ends when the stream ends, which happens once the owning
/// subscriber cancels the consumer or the channel closes.
pub struct AmqpConsumer<S> {
    deliveries: DeliveryStream,
    consumer_tag: String,
    requeue_rejected: bool,
    service: S,
}

impl<S> AmqpConsumer<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse, Error = anyhow::Error> + Send,
    S::Future: Send,
{
    pub fn new(
        deliveries: DeliveryStream,
        consumer_tag: &str,
        requeue_rejected: bool,
        service: S,
    ) -> Self {
        Self {
            deliveries,
            consumer_tag: consumer_tag.to_string(),
            requeue_rejected,
            service,
        }
    }

    /// Run until the delivery stream is closed
    pub async fn run(mut self) -> ConsumerStats {
        debug!(consumer_tag = %self.consumer_tag, "starting AMQP consumer");
        let mut stats = ConsumerStats::default();

        while let Some(next) = self.deliveries.next().await {
            match next {
                Ok(delivery) => self.process_delivery(delivery, &mut stats).await,
                Err(e) => {
                    error!(
                        consumer_tag = %self.consumer_tag,
                        error = %format!("{:#}", e),
                        "error receiving delivery"
                    );
                }
            }
        }

        info!(
            consumer_tag = %self.consumer_tag,
            acked = stats.acked,
            rejected = stats.rejected,
            settle_failures = stats.settle_failures,
            "delivery stream closed, consumer stopped"
        );
        stats
    }

    async fn process_delivery(&mut self, delivery: AmqpDelivery, stats: &mut ConsumerStats) {
        let span = debug_span!(
            "delivery",
            routing_key = %delivery.routing_key,
            exchange = %delivery.exchange,
            redelivered = delivery.redelivered,
        );
        self.handle(delivery, stats).instrument(span).await
    }

    async fn handle(&mut self, delivery: AmqpDelivery, stats: &mut ConsumerStats) {
        let request = ConsumeRequest::new(
            delivery.routing_key.clone(),
            delivery.payload.clone(),
            delivery.redelivered,
        );
        let payload_bytes = request.payload.len();
        let start = Instant::now();

        let response = match self.service.ready().await {
            Ok(service) => service.call(request).await,
            Err(e) => Err(e),
        };
        let duration_ms = start.elapsed().as_millis();

        let response = response.unwrap_or_else(|e| {
            error!(
                payload_bytes,
                duration_ms = %duration_ms,
                error = %format!("{:#}", e),
                "service error handling delivery"
            );
            ConsumeResponse::nack(e.to_string())
        });

        match response {
            ConsumeResponse::Ack => {
                debug!(payload_bytes, duration_ms = %duration_ms, outcome = "ack", "handled delivery");
                match delivery.ack().await {
                    Ok(()) => stats.acked += 1,
                    Err(e) => {
                        stats.settle_failures += 1;
                        error!(error = %format!("{:#}", e), "failed to acknowledge delivery");
                    }
                }
            }
            ConsumeResponse::Nack(reason) => {
                warn!(
                    payload_bytes,
                    duration_ms = %duration_ms,
                    outcome = "nack",
                    reason = reason.as_deref().unwrap_or("unspecified"),
                    requeue = self.requeue_rejected,
                    "rejecting delivery"
                );

                match delivery.nack(self.requeue_rejected).await {
                    Ok(()) => stats.rejected += 1,
                    Err(e) => {
                        stats.settle_failures += 1;
                        error!(error = %format!("{:#}", e), "failed to reject delivery");
                    }
                }
            }
        }
    }
}
