use crate::domain::{decode_observation, ObservationService};
use common::amqp::{ConsumeRequest, ConsumeResponse};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::{debug, error, warn};

/// Tower service for handling individual observation deliveries.
///
/// This service:
/// 1. Decodes the routing key and JSON payload into an `ObservationUpdate`
/// 2. Writes it through the domain `ObservationService`
/// 3. Returns Ack once written, Nack on a decode or store failure
///
/// Failures are reported through the response, never as a service error, so a bad
/// delivery cannot end the stream.
#[derive(Clone)]
pub struct ObservationConsumerService {
    domain_service: Arc<ObservationService>,
}

impl ObservationConsumerService {
    pub fn new(domain_service: Arc<ObservationService>) -> Self {
        Self { domain_service }
    }
}

impl Service<ConsumeRequest> for ObservationConsumerService {
    type Response = ConsumeResponse;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<ConsumeResponse, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let domain_service = Arc::clone(&self.domain_service);

        Box::pin(async move {
            let observation = match decode_observation(&req.routing_key, &req.payload) {
                Ok(observation) => observation,
                Err(e) => {
                    warn!(
                        error = %e,
                        routing_key = %req.routing_key,
                        redelivered = req.redelivered,
                        "discarding undecodable delivery"
                    );
                    return Ok(ConsumeResponse::nack(format!("Decode error: {}", e)));
                }
            };

            let entity_id = observation.entity_id.clone();

            match domain_service.write(observation).await {
                Ok(()) => {
                    debug!(entity_id = %entity_id, "observation stored");
                    Ok(ConsumeResponse::ack())
                }
                Err(e) => {
                    error!(
                        error = %e,
                        entity_id = %entity_id,
                        routing_key = %req.routing_key,
                        "failed to store observation"
                    );
                    Ok(ConsumeResponse::nack(e.to_string()))
                }
            }
        })
    }
}
