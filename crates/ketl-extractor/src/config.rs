//! Configuration management

use ketl_common::kafka::KafkaConfig;
use std::path::PathBuf;
use std::time::Duration;

use crate::publisher::DEFAULT_DELIVERY_TIMEOUT;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Extractor service configuration
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub server: ServerConfig,
    pub kafka: KafkaConfig,
    /// External structural schema; the embedded one is used when unset
    pub schema_path: Option<PathBuf>,
    pub delivery_timeout: Duration,
}

/// HTTP listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("EXTRACTOR_HOST")
                .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
            port: std::env::var("EXTRACTOR_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SERVER_PORT),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
        }
    }
}

impl ExtractorConfig {
    /// Load configuration from the environment (and `.env` when present)
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = ExtractorConfig {
            server: ServerConfig::from_env(),
            kafka: KafkaConfig::from_env()?,
            schema_path: std::env::var("EXTRACTOR_SCHEMA_PATH").ok().map(PathBuf::from),
            delivery_timeout: std::env::var("KAFKA_DELIVERY_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_DELIVERY_TIMEOUT),
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.delivery_timeout.is_zero() {
            anyhow::bail!("Kafka delivery timeout must be greater than 0");
        }

        self.kafka.validate()?;

        Ok(())
    }
}
