//! Error types for KETL

use thiserror::Error;

/// Result type alias for KETL operations
pub type Result<T> = std::result::Result<T, KetlError>;

/// Main error type shared by the pipeline crates
#[derive(Error, Debug)]
pub enum KetlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

impl KetlError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
