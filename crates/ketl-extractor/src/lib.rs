//! KETL Extractor Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! First stage of the accident estimate pipeline: an HTTP endpoint that
//! validates submitted records and publishes them to Kafka.
//!
//! # Overview
//!
//! - **Validation**: JSON Schema check, then ISO 4217 currency membership
//! - **Publishing**: identifier assignment and acknowledged delivery to Kafka
//! - **API**: `POST /review` mapping outcomes to 200 / 400 / 500
//!
//! A `200` means the record was acknowledged by the broker; the processor
//! writes it to PostgreSQL asynchronously.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ketl_extractor::{
//!     api::{self, AppState},
//!     config::ExtractorConfig,
//!     publisher::{KafkaRecordSink, RecordPublisher},
//!     validation::RecordValidator,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ExtractorConfig::load()?;
//!     let sink = KafkaRecordSink::new(&config.kafka, config.delivery_timeout)?;
//!     let state = AppState::new(
//!         RecordValidator::with_defaults()?,
//!         RecordPublisher::new(Arc::new(sink)),
//!     );
//!     api::serve(&config.server, state, ketl_common::shutdown::shutdown_signal()).await
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod middleware;
pub mod publisher;
pub mod validation;

// Re-export commonly used types
pub use error::{IngestError, IngestResult};
