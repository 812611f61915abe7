//! KETL Processor Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Second stage of the accident estimate pipeline: consumes validated records
//! from Kafka, flattens them into review rows and writes them to PostgreSQL.
//!
//! # Overview
//!
//! - **Consumer**: topic subscription and bounded polling
//! - **Extraction**: vehicle and address splitting into the 15 review columns
//! - **Store**: single connection with retried connect, DDL bootstrap and
//!   per-row transactions
//! - **Dead letters**: failed messages are republished (or logged) and the
//!   loop keeps going
//!
//! # Example
//!
//! ```no_run
//! use ketl_processor::{config::ProcessorConfig, pipeline};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ProcessorConfig::load()?;
//!     let stats = pipeline::start(&config, CancellationToken::new()).await?;
//!     println!("persisted {}", stats.persisted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod consumer;
pub mod db;
pub mod dead_letter;
pub mod error;
pub mod extract;
pub mod pipeline;

// Re-export commonly used types
pub use error::{ProcessorError, ProcessorResult};
pub use extract::{extract, RelationalRow};
pub use pipeline::{ProcessingLoop, ProcessorStats};
