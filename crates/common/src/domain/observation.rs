use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A decoded, validated observation taken from a single broker delivery.
///
/// Only constructed once every field has passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationUpdate {
    /// Physical source of the observation, taken from the routing key
    pub entity_id: String,
    /// Kind of measurement, e.g. "temperature"
    pub observation_type: String,
    pub value: f64,
    pub measured_at: DateTime<Utc>,
}

/// Repository trait for observation storage.
/// Infrastructure layer (e.g., postgres) implements this trait.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ObservationRepository: Send + Sync {
    /// Insert the observation, or overwrite the value and modification time of the
    /// existing row with the same (entity_id, observation_type) key.
    async fn upsert_observation(&self, observation: &ObservationUpdate) -> DomainResult<()>;
}
