use serde::{Deserialize, Serialize};

/// PostgreSQL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_pool_size: usize,
    /// Create the observations table at startup if it does not exist
    pub apply_schema: bool,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "observations".to_string(),
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            max_pool_size: 5,
            apply_schema: true,
        }
    }
}
