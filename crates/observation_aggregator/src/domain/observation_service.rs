use common::domain::{DomainResult, ObservationRepository, ObservationUpdate};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Domain service that writes the latest value per (entity, type) key
pub struct ObservationService {
    repository: Arc<dyn ObservationRepository>,
}

impl ObservationService {
    pub fn new(repository: Arc<dyn ObservationRepository>) -> Self {
        Self { repository }
    }

    /// Upsert a single observation. Failures are returned as `StoreFailure` and not retried.
    #[instrument(
        skip(self, observation),
        fields(
            entity_id = %observation.entity_id,
            observation_type = %observation.observation_type,
        )
    )]
    pub async fn write(&self, observation: ObservationUpdate) -> DomainResult<()> {
        debug!(
            value = observation.value,
            measured_at = %observation.measured_at,
            "writing observation"
        );

        self.repository.upsert_observation(&observation).await
    }
}
