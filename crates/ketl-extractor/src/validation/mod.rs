//! Record validation
//!
//! Two independent checks run in order: the structural schema, then currency
//! membership. A document that fails the schema never reaches the currency
//! check.

pub mod currency;
pub mod schema;

use ketl_common::IncomingRecord;
use serde_json::Value;
use thiserror::Error;

pub use currency::CurrencyWhitelist;
pub use schema::StructuralSchema;

/// Client-facing message for a currency outside the whitelist.
pub const INVALID_CURRENCY_MESSAGE: &str = "invalid currency code found";

/// Reasons a submitted record is rejected
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Document shape does not match the structural schema
    #[error("{0}")]
    Schema(String),

    /// Well-formed record with a currency outside the whitelist
    #[error("invalid currency code found")]
    Currency(String),

    /// The schema itself could not be loaded or compiled
    #[error("Invalid structural schema: {0}")]
    InvalidSchema(String),
}

/// Schema and currency checks for incoming records
#[derive(Debug)]
pub struct RecordValidator {
    schema: StructuralSchema,
    currencies: CurrencyWhitelist,
}

impl RecordValidator {
    pub fn new(schema: StructuralSchema, currencies: CurrencyWhitelist) -> Self {
        Self { schema, currencies }
    }

    /// Embedded schema with the ISO 4217 whitelist
    pub fn with_defaults() -> Result<Self, ValidationError> {
        Ok(Self::new(StructuralSchema::embedded()?, CurrencyWhitelist::iso4217()))
    }

    /// Check a raw document and turn it into a typed record
    #[tracing::instrument(skip_all)]
    pub fn validate(&self, document: Value) -> Result<IncomingRecord, ValidationError> {
        tracing::debug!("Validating the input record");
        self.schema.check(&document)?;

        let record: IncomingRecord = serde_json::from_value(document)
            .map_err(|e| ValidationError::Schema(e.to_string()))?;

        self.check_currency(&record)?;

        tracing::debug!("Input record validated");
        Ok(record)
    }

    pub fn check_currency(&self, record: &IncomingRecord) -> Result<(), ValidationError> {
        if self.currencies.contains(&record.currency) {
            Ok(())
        } else {
            Err(ValidationError::Currency(record.currency.clone()))
        }
    }
}
