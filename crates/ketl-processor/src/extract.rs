//! Column extraction
//!
//! Turns a [`ValidatedRecord`] into the fixed 15-column row of the `review`
//! table. Pure: no I/O, no logging side effects beyond a debug event.

use ketl_common::ValidatedRecord;
use thiserror::Error;

/// Number of components in `vehicle`: brand, model, production year.
pub const VEHICLE_PARTS: usize = 3;

/// Number of components in `address`: street, post code, state, city, country.
pub const ADDRESS_PARTS: usize = 5;

/// Column order of the `review` table.
pub const REVIEW_COLUMNS: [&str; 15] = [
    "id",
    "brand",
    "model",
    "production_year",
    "policy_holder_name",
    "address",
    "post_code",
    "state",
    "city",
    "country",
    "currency",
    "total_cost",
    "time_of_accident",
    "estimate",
    "raw",
];

/// A record that cannot be mapped onto the review columns
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Field '{field}' must have {expected} comma-separated parts, found {found}")]
    FieldArity {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("total_cost {0} is not representable as a float")]
    NonFiniteCost(String),

    #[error("Failed to serialize record: {0}")]
    Serialization(String),
}

/// One row of the `review` table, in column order
#[derive(Debug, Clone, PartialEq)]
pub struct RelationalRow {
    pub id: String,
    pub brand: String,
    pub model: String,
    pub production_year: String,
    pub policy_holder_name: String,
    pub address: String,
    pub post_code: String,
    pub state: String,
    pub city: String,
    pub country: String,
    pub currency: String,
    pub total_cost: f64,
    pub time_of_accident: String,
    /// JSON text of the estimate list
    pub estimate: String,
    /// JSON text of the whole record, `_id` included
    pub raw: String,
}

/// Map a record onto the review columns
pub fn extract(record: &ValidatedRecord) -> Result<RelationalRow, ExtractionError> {
    let incoming = &record.record;

    let [brand, model, production_year] =
        split_normalized::<{ VEHICLE_PARTS }>("vehicle", &incoming.vehicle)?;
    let [address, post_code, state, city, country] =
        split_normalized::<{ ADDRESS_PARTS }>("address", &incoming.address)?;

    let total_cost = incoming
        .total_cost
        .as_f64()
        .filter(|cost| cost.is_finite())
        .ok_or_else(|| ExtractionError::NonFiniteCost(incoming.total_cost.to_string()))?;

    let estimate = serde_json::to_string(&incoming.estimate)
        .map_err(|e| ExtractionError::Serialization(e.to_string()))?;
    let raw = record
        .to_json()
        .map_err(|e| ExtractionError::Serialization(e.to_string()))?;

    tracing::debug!(record_id = %record.id, "Extracted review columns");

    Ok(RelationalRow {
        id: record.id.clone(),
        brand,
        model,
        production_year,
        policy_holder_name: incoming.fullname.clone(),
        address,
        post_code,
        state,
        city,
        country,
        currency: incoming.currency.clone(),
        total_cost,
        time_of_accident: incoming.time_of_accident.clone(),
        estimate,
        raw,
    })
}

/// Split on commas into exactly `N` trimmed, lower-cased parts
fn split_normalized<const N: usize>(
    field: &'static str,
    value: &str,
) -> Result<[String; N], ExtractionError> {
    let parts: Vec<String> = value.split(',').map(|p| p.trim().to_lowercase()).collect();
    let found = parts.len();

    parts.try_into().map_err(|_| ExtractionError::FieldArity {
        field,
        expected: N,
        found,
    })
}
