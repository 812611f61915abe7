//! HTTP surface of the extractor
//!
//! # Route Structure
//!
//! - `POST /review` - Validate an accident estimate and queue it for persistence
//!
//! Every other path answers `404 Not Found`.

pub mod response;

use axum::{body::Bytes, extract::State, routing::post, Router};
use serde_json::Value;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::IngestResult;
use crate::middleware;
use crate::publisher::RecordPublisher;
use crate::validation::{RecordValidator, ValidationError};
use response::AcceptedBody;

/// Shared, read-only state for request handlers
#[derive(Clone)]
pub struct AppState {
    pub validator: Arc<RecordValidator>,
    pub publisher: Arc<RecordPublisher>,
}

impl AppState {
    pub fn new(validator: RecordValidator, publisher: RecordPublisher) -> Self {
        Self {
            validator: Arc::new(validator),
            publisher: Arc::new(publisher),
        }
    }
}

/// Build the router with the review route and request tracing
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/review", post(submit_review))
        .with_state(state)
        .layer(middleware::tracing_layer())
}

/// Accept an accident estimate
///
/// # Endpoint
///
/// `POST /review`
///
/// # Response
///
/// - `200 OK` - `{"status": 200, "message": "Record persisted"}`
/// - `400 Bad Request` - schema violation, or `"invalid currency code found"`
/// - `500 Internal Server Error` - the channel did not acknowledge the record
///
/// The body is parsed regardless of `Content-Type`.
#[tracing::instrument(skip_all, fields(body_len = body.len()))]
async fn submit_review(State(state): State<AppState>, body: Bytes) -> IngestResult<AcceptedBody> {
    let document: Value = serde_json::from_slice(&body)
        .map_err(|e| ValidationError::Schema(format!("Request body is not valid JSON: {e}")))?;

    let record = state.validator.validate(document)?;
    info!("Record validated, queuing for persistence");

    let validated = state.publisher.publish(record).await?;
    info!(record_id = %validated.id, "Record accepted");

    Ok(AcceptedBody::new())
}

/// Bind and serve until `shutdown` resolves
pub async fn serve<F>(config: &ServerConfig, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}
