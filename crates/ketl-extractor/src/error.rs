//! Ingestion error types and their HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::api::response::ErrorBody;
use crate::publisher::PublishError;
use crate::validation::ValidationError;

/// Result type alias for ingestion operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Failure while accepting a record
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl IngestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::Validation(ValidationError::InvalidSchema(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
            IngestError::Validation(_) => StatusCode::BAD_REQUEST,
            IngestError::Publish(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match self {
            IngestError::Validation(ValidationError::Currency(ref code)) => {
                tracing::warn!(currency = %code, "Rejected record with unknown currency");
            },
            IngestError::Validation(ValidationError::Schema(ref detail)) => {
                tracing::warn!(detail = %detail, "Rejected record failing schema validation");
            },
            IngestError::Validation(ValidationError::InvalidSchema(ref detail)) => {
                tracing::error!(detail = %detail, "Structural schema unusable");
            },
            IngestError::Publish(ref e) => {
                tracing::error!(error = %e, "Failed to publish record");
            },
        }

        (status, Json(ErrorBody::new(status, self.to_string()))).into_response()
    }
}
