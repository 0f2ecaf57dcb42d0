use crate::postgres::PostgresConfig;
use anyhow::{Context, Result};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// DDL for the observations table, applied at startup when enabled
pub const OBSERVATIONS_SCHEMA: &str =
    include_str!("../../migrations/postgres/001_create_observations.sql");

/// PostgreSQL client wrapper with connection pooling
#[derive(Clone)]
pub struct PostgresClient {
    pool: Pool,
}

impl PostgresClient {
    /// Creates a new PostgreSQL client with connection pooling
    ///
    /// # Arguments
    /// * `host` - Database host (e.g., "localhost")
    /// * `port` - Database port (e.g., 5432)
    /// * `database` - Database name
    /// * `username` - Database username
    /// * `password` - Database password
    /// * `max_pool_size` - Maximum number of connections in the pool
    pub fn new(
        host: &str,
        port: u16,
        database: &str,
        username: &str,
        password: &str,
        max_pool_size: usize,
    ) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.host = Some(host.to_string());
        cfg.port = Some(port);
        cfg.dbname = Some(database.to_string());
        cfg.user = Some(username.to_string());
        cfg.password = Some(password.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("failed to create postgres pool")?;
        pool.resize(max_pool_size);

        Ok(Self { pool })
    }

    pub fn from_config(config: &PostgresConfig) -> Result<Self> {
        Self::new(
            &config.host,
            config.port,
            &config.database,
            &config.username,
            &config.password,
            config.max_pool_size,
        )
    }

    /// Pings the database to verify connectivity
    pub async fn ping(&self) -> Result<()> {
        let client = self.get_connection().await?;
        client.execute("SELECT 1", &[]).await?;
        debug!("postgreSQL connection successful");
        Ok(())
    }

    /// Creates the observations table if it does not exist yet
    pub async fn apply_schema(&self) -> Result<()> {
        let client = self.get_connection().await?;
        client
            .batch_execute(OBSERVATIONS_SCHEMA)
            .await
            .context("failed to apply observations schema")?;
        info!("observations schema applied");
        Ok(())
    }

    /// Gets a connection from the pool
    pub async fn get_connection(&self) -> Result<deadpool_postgres::Client> {
        self.pool
            .get()
            .await
            .context("failed to get postgres connection from pool")
    }

    /// Closes the pool; connections are dropped as they are returned
    pub fn close(&self) {
        info!("closing postgres pool");
        self.pool.close();
    }
}
