//! KETL Processor - Main entry point

use anyhow::Result;
use ketl_common::logging::{init_logging, LogConfig};
use ketl_common::shutdown::shutdown_signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use ketl_processor::{config::ProcessorConfig, pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::for_service(
        "ketl-processor",
        "ketl_processor=debug,ketl_common=info,sqlx=warn,rdkafka=warn",
    )
    .with_env()?;
    init_logging(&log_config)?;

    info!("Starting KETL processor");

    let config = ProcessorConfig::load()?;
    info!(
        brokers = %config.kafka.brokers,
        topics = ?config.kafka.topics,
        group_id = %config.group_id,
        "Configuration loaded"
    );

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    });

    let stats = pipeline::start(&config, shutdown).await?;

    info!(
        consumed = stats.consumed,
        persisted = stats.persisted,
        dead_lettered = stats.dead_lettered,
        "Processor shut down gracefully"
    );
    Ok(())
}
