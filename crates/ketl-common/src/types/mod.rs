//! Accident estimate record model
//!
//! The same document travels from the HTTP request, through the channel, into
//! the `raw` column. Numeric fields keep their JSON representation
//! (`serde_json::Number`) and unknown fields are carried along untouched, so
//! decoding the stored text gives back exactly what was published.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use uuid::Uuid;

use crate::error::Result;

/// Field holding the identifier assigned at acceptance time.
pub const RECORD_ID_FIELD: &str = "_id";

/// One line of the repair estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateItem {
    pub panel: String,
    pub cost: Number,
    pub operation: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Accident estimate as submitted by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingRecord {
    /// "brand, model, production year"
    pub vehicle: String,
    /// Policyholder full name
    pub fullname: String,
    /// "street, post code, state, city, country"
    pub address: String,
    pub currency: String,
    pub total_cost: Number,
    /// Free text, stored as received
    pub time_of_accident: String,
    pub estimate: Vec<EstimateItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An accepted record, stamped with its identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub record: IncomingRecord,
}

impl ValidatedRecord {
    /// Stamp a record with a fresh random identifier (32 lowercase hex chars)
    ///
    /// Any client-supplied `_id` is discarded.
    pub fn accept(mut record: IncomingRecord) -> Self {
        record.extra.remove(RECORD_ID_FIELD);
        Self {
            id: new_record_id(),
            record,
        }
    }

    /// Decode a channel message
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Encode for the channel and the `raw` column
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Random 128-bit identifier rendered as hex without hyphens
pub fn new_record_id() -> String {
    Uuid::new_v4().simple().to_string()
}
