//! Record publishing onto the durable channel
//!
//! [`RecordPublisher`] stamps an accepted record with its identifier and
//! hands the JSON text to a [`RecordSink`]. The Kafka sink only reports
//! success once the broker has acknowledged the message.

use async_trait::async_trait;
use ketl_common::{kafka::KafkaConfig, IncomingRecord, KetlError, ValidatedRecord};
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Default time to wait for a delivery acknowledgement.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure to hand a record to the channel
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Broker rejected record: {0}")]
    Delivery(String),

    #[error("Failed to create producer: {0}")]
    Producer(String),
}

impl From<KetlError> for PublishError {
    fn from(err: KetlError) -> Self {
        match err {
            KetlError::Serialization(e) => PublishError::Serialization(e),
            other => PublishError::Producer(other.to_string()),
        }
    }
}

/// Transport that carries one serialized record to the channel
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Deliver `payload` under `key`, returning once it is acknowledged
    async fn send(&self, key: &str, payload: &str) -> Result<(), PublishError>;
}

/// Kafka producer writing to a single topic
pub struct KafkaRecordSink {
    producer: FutureProducer,
    topic: String,
    delivery_timeout: Duration,
}

impl KafkaRecordSink {
    pub fn new(config: &KafkaConfig, delivery_timeout: Duration) -> Result<Self, PublishError> {
        let topic = config.primary_topic()?.to_string();

        let producer: FutureProducer = config
            .client_config()
            .set("message.timeout.ms", delivery_timeout.as_millis().to_string())
            .create()
            .map_err(|e| PublishError::Producer(e.to_string()))?;

        info!(brokers = %config.brokers, topic = %topic, "Kafka producer created");

        Ok(Self {
            producer,
            topic,
            delivery_timeout,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl RecordSink for KafkaRecordSink {
    async fn send(&self, key: &str, payload: &str) -> Result<(), PublishError> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);

        // The delivery future resolves on the broker's acknowledgement.
        self.producer
            .send(record, self.delivery_timeout)
            .await
            .map(|_| ())
            .map_err(|(err, _)| PublishError::Delivery(err.to_string()))
    }
}

/// Assigns identifiers and publishes accepted records
pub struct RecordPublisher {
    sink: Arc<dyn RecordSink>,
}

impl RecordPublisher {
    pub fn new(sink: Arc<dyn RecordSink>) -> Self {
        Self { sink }
    }

    /// Stamp, serialize and deliver a record
    #[tracing::instrument(skip_all)]
    pub async fn publish(&self, record: IncomingRecord) -> Result<ValidatedRecord, PublishError> {
        let validated = ValidatedRecord::accept(record);
        let payload = validated.to_json()?;

        self.sink.send(&validated.id, &payload).await?;

        debug!(record_id = %validated.id, "Record published");
        Ok(validated)
    }
}
