//! KETL Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the KETL pipeline.
//!
//! # Overview
//!
//! This crate provides functionality used by both pipeline services:
//!
//! - **Error Handling**: Shared error type and result alias
//! - **Logging**: Centralized `tracing` subscriber setup
//! - **Kafka**: Broker connection settings shared by producer and consumer
//! - **Retry**: Bounded retry with a fixed delay between attempts
//! - **Shutdown**: Ctrl+C / SIGTERM handling shared by both binaries
//! - **Types**: The accident estimate record model carried on the channel
//!
//! # Example
//!
//! ```no_run
//! use ketl_common::logging::{init_logging, LogConfig};
//! use ketl_common::kafka::KafkaConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     let kafka = KafkaConfig::from_env()?;
//!     tracing::info!(brokers = %kafka.brokers, "Kafka configured");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod kafka;
pub mod logging;
pub mod retry;
pub mod shutdown;
pub mod types;

// Re-export commonly used types
pub use error::{KetlError, Result};
pub use types::{EstimateItem, IncomingRecord, ValidatedRecord};
