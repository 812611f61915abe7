//! Configuration management

use ketl_common::kafka::KafkaConfig;
use std::path::PathBuf;
use std::time::Duration;

use crate::consumer::{DEFAULT_GROUP_ID, DEFAULT_POLL_TIMEOUT};
use crate::db::DatabaseConfig;

/// Default wait for a dead-letter delivery acknowledgement.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Processor service configuration
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub kafka: KafkaConfig,
    pub group_id: String,
    pub poll_timeout: Duration,
    /// Topic for unprocessable messages; logged and dropped when unset
    pub dlq_topic: Option<String>,
    pub delivery_timeout: Duration,
    pub database: DatabaseConfig,
    /// External DDL script; the embedded one is used when unset
    pub ddl_path: Option<PathBuf>,
}

impl ProcessorConfig {
    /// Load configuration from the environment (and `.env` when present)
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = ProcessorConfig {
            kafka: KafkaConfig::from_env()?,
            group_id: std::env::var("KAFKA_GROUP_ID")
                .unwrap_or_else(|_| DEFAULT_GROUP_ID.to_string()),
            poll_timeout: std::env::var("PROCESSOR_POLL_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_POLL_TIMEOUT),
            dlq_topic: std::env::var("KAFKA_DLQ_TOPIC")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            delivery_timeout: std::env::var("KAFKA_DELIVERY_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_DELIVERY_TIMEOUT),
            database: DatabaseConfig::from_env()?,
            ddl_path: std::env::var("DDL_PATH").ok().map(PathBuf::from),
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.group_id.trim().is_empty() {
            anyhow::bail!("Kafka consumer group cannot be empty");
        }

        if self.poll_timeout.is_zero() {
            anyhow::bail!("Poll timeout must be greater than 0");
        }

        if self.delivery_timeout.is_zero() {
            anyhow::bail!("Kafka delivery timeout must be greater than 0");
        }

        if let Some(ref topic) = self.dlq_topic {
            if self.kafka.topics.iter().any(|t| t == topic) {
                anyhow::bail!("Dead-letter topic '{}' must differ from the source topics", topic);
            }
        }

        self.kafka.validate()?;
        self.database.validate()?;

        Ok(())
    }
}
