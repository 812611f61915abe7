//! Error types for the processing loop
//!
//! Stage errors ([`ParseError`], [`ExtractionError`], [`PersistError`]) are
//! gathered into [`ProcessError`] for a single message. [`ProcessorError`] is
//! what stops the loop.

use thiserror::Error;

use crate::consumer::ConsumeError;
use crate::db::{ConnectError, PersistError};
use crate::dead_letter::DeadLetterError;
use crate::extract::ExtractionError;

/// Message text that does not decode into a validated record
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Message is not a valid record: {0}")]
pub struct ParseError(pub String);

impl From<ketl_common::KetlError> for ParseError {
    fn from(err: ketl_common::KetlError) -> Self {
        Self(err.to_string())
    }
}

/// Failure handling one channel message
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl ProcessError {
    /// Short label used in logs and dead-letter headers
    pub fn stage(&self) -> &'static str {
        match self {
            ProcessError::Parse(_) => "parse",
            ProcessError::Extraction(_) => "extract",
            ProcessError::Persist(_) => "persist",
        }
    }
}

/// Conditions that terminate the processor
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Failed to read DDL script: {0}")]
    Ddl(#[from] std::io::Error),

    #[error("Failed to connect to the store: {0}")]
    Connect(#[from] ConnectError),

    #[error("Failed to apply the store schema: {0}")]
    Schema(#[source] PersistError),

    #[error("Store connection failed while persisting: {0}")]
    Persist(#[source] PersistError),

    #[error("Failed to dead-letter a message: {0}")]
    DeadLetter(#[from] DeadLetterError),

    #[error("Failed to start the consumer: {0}")]
    Consumer(#[from] ConsumeError),
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;
