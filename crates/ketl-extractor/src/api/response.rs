//! Response bodies for the review endpoint
//!
//! Every body mirrors the HTTP status code in a `status` field.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Message returned once a record is accepted for asynchronous persistence.
pub const ACCEPTED_MESSAGE: &str = "Record persisted";

/// Success body: `{"status": 200, "message": "Record persisted"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedBody {
    pub status: u16,
    pub message: String,
}

impl AcceptedBody {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK.as_u16(),
            message: ACCEPTED_MESSAGE.to_string(),
        }
    }
}

impl Default for AcceptedBody {
    fn default() -> Self {
        Self::new()
    }
}

impl IntoResponse for AcceptedBody {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Error body: `{"status": 400, "error": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub error: String,
}

impl ErrorBody {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            error: error.into(),
        }
    }
}
