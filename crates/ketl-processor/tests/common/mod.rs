//! Shared fixtures for processor integration tests
//!
//! In-memory stand-ins for the channel, the store and the dead-letter sink,
//! plus a PostgreSQL container wrapper for the store tests.
#![allow(dead_code)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use ketl_common::kafka::KafkaConfig;
use ketl_processor::consumer::{ChannelMessage, ConsumeError, MessageSource};
use ketl_processor::db::{PersistError, ReviewStore};
use ketl_processor::dead_letter::{DeadLetterError, DeadLetterSink};
use ketl_processor::RelationalRow;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::kafka::{Kafka, KAFKA_PORT};
use testcontainers_modules::postgres::Postgres;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const TEST_TOPIC: &str = "reviews";

/// Initialize tracing for tests
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,ketl_processor=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}

/// A record as the extractor would publish it
pub fn review_json(id: &str, address: &str) -> Value {
    json!({
        "_id": id,
        "vehicle": "Honda,CIVIC,2020",
        "fullname": "Tony Stark",
        "address": address,
        "time_of_accident": "2013 04-25-2013 10:10:07",
        "total_cost": 1000,
        "currency": "USD",
        "estimate": [
            {"panel": "FRONT LEFT WING", "cost": 1000, "operation": "REPAIR"}
        ]
    })
}

pub fn valid_review(id: &str) -> Value {
    review_json(id, "10880 Malibu Point, 90265, Florida, Malibu, USA")
}

// ============================================================================
// Channel
// ============================================================================

/// Shared queue written by the test (or an extractor sink) and drained by
/// [`InMemorySource`]
#[derive(Clone, Default)]
pub struct InMemoryChannel {
    queue: Arc<Mutex<VecDeque<Result<ChannelMessage, RDKafkaErrorCode>>>>,
    next_offset: Arc<Mutex<i64>>,
}

impl InMemoryChannel {
    pub fn push_payload(&self, payload: impl Into<Vec<u8>>) {
        let mut offset = self.next_offset.lock().unwrap();
        self.queue.lock().unwrap().push_back(Ok(ChannelMessage {
            topic: TEST_TOPIC.to_string(),
            partition: 0,
            offset: *offset,
            payload: payload.into(),
        }));
        *offset += 1;
    }

    pub fn push_json(&self, value: &Value) {
        self.push_payload(value.to_string());
    }

    pub fn push_broker_error(&self, code: RDKafkaErrorCode) {
        self.queue.lock().unwrap().push_back(Err(code));
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

/// [`MessageSource`] over an [`InMemoryChannel`]
///
/// Cancels `drained` once the queue is empty so a loop under test stops by
/// itself after the last message.
pub struct InMemorySource {
    channel: InMemoryChannel,
    drained: Option<CancellationToken>,
    closed: Arc<Mutex<bool>>,
    acked: Arc<Mutex<Vec<i64>>>,
}

impl InMemorySource {
    pub fn new(channel: InMemoryChannel) -> Self {
        Self {
            channel,
            drained: None,
            closed: Arc::new(Mutex::new(false)),
            acked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn stop_when_drained(mut self, token: CancellationToken) -> Self {
        self.drained = Some(token);
        self
    }

    pub fn closed_flag(&self) -> Arc<Mutex<bool>> {
        self.closed.clone()
    }

    /// Offsets acknowledged by the loop, in order
    pub fn acked_offsets(&self) -> Arc<Mutex<Vec<i64>>> {
        self.acked.clone()
    }
}

#[async_trait]
impl MessageSource for InMemorySource {
    async fn poll(&mut self, _timeout: Duration) -> Result<Option<ChannelMessage>, ConsumeError> {
        if *self.closed.lock().unwrap() {
            return Err(ConsumeError::Closed);
        }

        let next = self.channel.queue.lock().unwrap().pop_front();
        match next {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(code)) => Err(ConsumeError::Kafka(KafkaError::MessageConsumption(code))),
            None => {
                if let Some(ref token) = self.drained {
                    token.cancel();
                }
                tokio::task::yield_now().await;
                Ok(None)
            },
        }
    }

    async fn ack(&mut self, message: &ChannelMessage) -> Result<(), ConsumeError> {
        if *self.closed.lock().unwrap() {
            return Err(ConsumeError::Closed);
        }
        self.acked.lock().unwrap().push(message.offset);
        Ok(())
    }

    async fn close(&mut self) {
        *self.closed.lock().unwrap() = true;
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Default)]
pub struct StoreState {
    pub rows: Vec<RelationalRow>,
    pub schema_applied: u32,
    pub closed: bool,
    /// Errors returned by the next persist calls, in order
    pub failures: VecDeque<PersistError>,
    pub schema_failure: Option<PersistError>,
}

/// [`ReviewStore`] keeping rows in memory, with a primary key on `id`
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
    cancel_on_persist: Option<CancellationToken>,
}

impl InMemoryStore {
    pub fn fail_next(&self, err: PersistError) {
        self.state.lock().unwrap().failures.push_back(err);
    }

    pub fn fail_schema(&self, err: PersistError) {
        self.state.lock().unwrap().schema_failure = Some(err);
    }

    /// Cancel `token` from inside the first persist call
    pub fn cancel_on_persist(mut self, token: CancellationToken) -> Self {
        self.cancel_on_persist = Some(token);
        self
    }

    pub fn rows(&self) -> Vec<RelationalRow> {
        self.state.lock().unwrap().rows.clone()
    }

    pub fn schema_applied(&self) -> u32 {
        self.state.lock().unwrap().schema_applied
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

#[async_trait]
impl ReviewStore for InMemoryStore {
    async fn ensure_schema(&mut self) -> Result<(), PersistError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.schema_failure.take() {
            return Err(err);
        }
        state.schema_applied += 1;
        Ok(())
    }

    async fn persist(&mut self, row: &RelationalRow) -> Result<(), PersistError> {
        if let Some(ref token) = self.cancel_on_persist {
            token.cancel();
        }

        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(PersistError::Closed);
        }
        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }
        if state.rows.iter().any(|r| r.id == row.id) {
            return Err(PersistError::Statement(format!(
                "duplicate key value violates unique constraint \"review_pkey\": {}",
                row.id
            )));
        }
        state.rows.push(row.clone());
        Ok(())
    }

    async fn close(&mut self) {
        self.state.lock().unwrap().closed = true;
    }
}

// ============================================================================
// Dead letters
// ============================================================================

/// [`DeadLetterSink`] recording every message it receives
#[derive(Clone, Default)]
pub struct RecordingDeadLetters {
    received: Arc<Mutex<Vec<(ChannelMessage, String)>>>,
    fail: bool,
}

impl RecordingDeadLetters {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn received(&self) -> Vec<(ChannelMessage, String)> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterSink for RecordingDeadLetters {
    async fn send(&self, message: &ChannelMessage, reason: &str) -> Result<(), DeadLetterError> {
        if self.fail {
            return Err(DeadLetterError::Delivery("Message timed out".to_string()));
        }
        self.received
            .lock()
            .unwrap()
            .push((message.clone(), reason.to_string()));
        Ok(())
    }
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with its connection URL
pub struct TestPostgres {
    container: ContainerAsync<Postgres>,
    url: String,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        Ok(Self { container, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

// ============================================================================
// Kafka Test Container
// ============================================================================

/// Single-broker Kafka container with its bootstrap address
pub struct TestKafka {
    container: ContainerAsync<Kafka>,
    brokers: String,
}

impl TestKafka {
    pub async fn start() -> Result<Self> {
        info!("Starting Kafka test container...");

        let container = Kafka::default()
            .start()
            .await
            .context("Failed to start Kafka container")?;

        let port = container
            .get_host_port_ipv4(KAFKA_PORT)
            .await
            .context("Failed to get container port")?;

        Ok(Self {
            container,
            brokers: format!("127.0.0.1:{}", port),
        })
    }

    /// Client settings for `topic` on this broker
    pub fn config(&self, topic: &str) -> KafkaConfig {
        KafkaConfig {
            brokers: self.brokers.clone(),
            topics: vec![topic.to_string()],
            session_timeout_ms: 6000,
            credentials: None,
        }
    }
}
