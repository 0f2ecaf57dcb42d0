mod config;

use aggregator_runner::Runner;
use common::amqp::{AmqpSubscriber, LapinConnector};
use common::postgres::{PostgresClient, PostgresObservationRepository};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use config::ServiceConfig;
use observation_aggregator::{ObservationAggregator, ObservationAggregatorConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const CONFIG_FILE_ENV: &str = "AGGREGATOR_CONFIG_FILE";

#[tokio::main]
async fn main() {
    // Optional YAML file: first CLI argument, else AGGREGATOR_CONFIG_FILE
    let config_file = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_FILE_ENV).ok());

    let config = match ServiceConfig::load(config_file.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(provider) => provider,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        otel_enabled = config.otel_enabled,
        config_file = config_file.as_deref().unwrap_or("<none>"),
        "Starting observation aggregator"
    );
    debug!("Configuration: {:?}", config);

    // Store initialization; a statement that cannot be prepared is fatal
    let (postgres_client, repository) = match initialize_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to initialize PostgreSQL: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let consumer_tag = match config.consumer_tag() {
        Some(tag) => tag.to_string(),
        None => {
            let tag = xid::new().to_string();
            info!(consumer_tag = %tag, "no consumer tag configured, generated one");
            tag
        }
    };

    let subscriber = AmqpSubscriber::new(
        Arc::new(LapinConnector::new()),
        config.subscriber_config(consumer_tag),
    );

    let aggregator = ObservationAggregator::new(
        subscriber,
        Arc::new(repository),
        ObservationAggregatorConfig {
            requeue_rejected: config.amqp_requeue_rejected,
        },
    );

    Runner::new()
        .with_boxed_process("observation_aggregator", aggregator.into_runner_process())
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            postgres_client.close();

            // Flush pending spans
            shutdown_telemetry(telemetry_providers);

            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(config.shutdown_timeout_secs))
        .run()
        .await;
}

async fn initialize_store(
    config: &ServiceConfig,
) -> anyhow::Result<(PostgresClient, PostgresObservationRepository)> {
    info!("Initializing PostgreSQL...");
    let postgres_config = config.postgres_config();
    let client = PostgresClient::from_config(&postgres_config)?;
    client.ping().await?;

    if postgres_config.apply_schema {
        client.apply_schema().await?;
    }

    let repository = PostgresObservationRepository::new(client.clone());
    repository.prepare().await?;

    Ok((client, repository))
}
