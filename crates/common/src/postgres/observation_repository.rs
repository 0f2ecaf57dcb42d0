use crate::domain::{DomainError, DomainResult, ObservationRepository, ObservationUpdate};
use crate::postgres::PostgresClient;
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument};

const UPSERT_OBSERVATION: &str = "INSERT INTO observations (entity_id, observation_type, value, measured_at, modified_at)
     VALUES ($1, $2, $3, $4, $5)
     ON CONFLICT (entity_id, observation_type) DO UPDATE SET
         value = EXCLUDED.value,
         measured_at = EXCLUDED.measured_at,
         modified_at = EXCLUDED.modified_at";

/// PostgreSQL implementation of ObservationRepository.
///
/// The upsert goes through the pool's statement cache, so it is prepared once per
/// pooled connection and reused for the repository's lifetime.
#[derive(Clone)]
pub struct PostgresObservationRepository {
    client: PostgresClient,
}

impl PostgresObservationRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    /// Prepares the upsert statement up front. A failure here (missing table,
    /// mismatched columns) is a startup error rather than a per-write one.
    pub async fn prepare(&self) -> anyhow::Result<()> {
        let conn = self.client.get_connection().await?;
        conn.prepare_cached(UPSERT_OBSERVATION)
            .await
            .context("failed to prepare observation upsert")?;
        info!("observation upsert statement prepared");
        Ok(())
    }
}

#[async_trait]
impl ObservationRepository for PostgresObservationRepository {
    #[instrument(
        skip(self, observation),
        fields(
            entity_id = %observation.entity_id,
            observation_type = %observation.observation_type,
        )
    )]
    async fn upsert_observation(&self, observation: &ObservationUpdate) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::StoreFailure)?;

        let statement = conn
            .prepare_cached(UPSERT_OBSERVATION)
            .await
            .map_err(|e| DomainError::StoreFailure(e.into()))?;

        let modified_at = Utc::now();
        conn.execute(
            &statement,
            &[
                &observation.entity_id,
                &observation.observation_type,
                &observation.value,
                &observation.measured_at,
                &modified_at,
            ],
        )
        .await
        .map_err(|e| DomainError::StoreFailure(e.into()))?;

        debug!(value = observation.value, "observation upserted");
        Ok(())
    }
}
