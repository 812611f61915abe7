//! KETL Extractor - Main entry point

use anyhow::{Context, Result};
use ketl_common::logging::{init_logging, LogConfig};
use ketl_common::shutdown::shutdown_signal;
use std::sync::Arc;
use tracing::info;

use ketl_extractor::{
    api::{self, AppState},
    config::ExtractorConfig,
    publisher::{KafkaRecordSink, RecordPublisher},
    validation::{CurrencyWhitelist, RecordValidator, StructuralSchema},
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::for_service(
        "ketl-extractor",
        "ketl_extractor=debug,tower_http=info,rdkafka=warn",
    )
    .with_env()?;
    init_logging(&log_config)?;

    info!("Starting KETL extractor");

    let config = ExtractorConfig::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let schema = match config.schema_path {
        Some(ref path) => {
            info!(path = %path.display(), "Loading structural schema from file");
            StructuralSchema::from_file(path)
        },
        None => StructuralSchema::embedded(),
    }
    .context("Failed to load structural schema")?;

    let currencies = CurrencyWhitelist::iso4217();
    info!(currencies = currencies.len(), "Currency whitelist ready");

    let sink = KafkaRecordSink::new(&config.kafka, config.delivery_timeout)
        .context("Failed to create Kafka producer")?;
    info!("Publishing to topic {}", sink.topic());

    let state = AppState::new(
        RecordValidator::new(schema, currencies),
        RecordPublisher::new(Arc::new(sink)),
    );

    api::serve(&config.server, state, shutdown_signal()).await
}
