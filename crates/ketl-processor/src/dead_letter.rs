//! Dead-letter path for messages the loop cannot store
//!
//! The original payload is republished untouched; the failure reason and
//! source position travel as headers.

use async_trait::async_trait;
use ketl_common::kafka::KafkaConfig;
use rdkafka::error::KafkaError;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

use crate::consumer::ChannelMessage;

pub const HEADER_ERROR: &str = "ketl.error";
pub const HEADER_SOURCE_TOPIC: &str = "ketl.source.topic";
pub const HEADER_SOURCE_PARTITION: &str = "ketl.source.partition";
pub const HEADER_SOURCE_OFFSET: &str = "ketl.source.offset";

#[derive(Debug, Error)]
pub enum DeadLetterError {
    #[error("Failed to create dead-letter producer: {0}")]
    Producer(#[from] KafkaError),

    #[error("Dead-letter delivery failed: {0}")]
    Delivery(String),
}

/// Destination for messages that failed processing
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, message: &ChannelMessage, reason: &str) -> Result<(), DeadLetterError>;
}

/// Republishes failed messages to a dedicated topic
pub struct KafkaDeadLetterSink {
    producer: FutureProducer,
    topic: String,
    delivery_timeout: Duration,
}

impl KafkaDeadLetterSink {
    pub fn new(
        config: &KafkaConfig,
        topic: impl Into<String>,
        delivery_timeout: Duration,
    ) -> Result<Self, DeadLetterError> {
        let producer: FutureProducer = config
            .client_config()
            .set("message.timeout.ms", delivery_timeout.as_millis().to_string())
            .create()?;

        Ok(Self {
            producer,
            topic: topic.into(),
            delivery_timeout,
        })
    }
}

#[async_trait]
impl DeadLetterSink for KafkaDeadLetterSink {
    async fn send(&self, message: &ChannelMessage, reason: &str) -> Result<(), DeadLetterError> {
        let partition = message.partition.to_string();
        let offset = message.offset.to_string();

        let headers = OwnedHeaders::new()
            .insert(Header {
                key: HEADER_ERROR,
                value: Some(reason.as_bytes()),
            })
            .insert(Header {
                key: HEADER_SOURCE_TOPIC,
                value: Some(message.topic.as_bytes()),
            })
            .insert(Header {
                key: HEADER_SOURCE_PARTITION,
                value: Some(partition.as_bytes()),
            })
            .insert(Header {
                key: HEADER_SOURCE_OFFSET,
                value: Some(offset.as_bytes()),
            });

        let record: FutureRecord<'_, (), [u8]> = FutureRecord::to(&self.topic)
            .payload(message.payload.as_slice())
            .headers(headers);

        self.producer
            .send(record, self.delivery_timeout)
            .await
            .map_err(|(e, _)| DeadLetterError::Delivery(e.to_string()))?;

        warn!(
            dlq_topic = %self.topic,
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            reason,
            "Message dead-lettered"
        );
        Ok(())
    }
}

/// Fallback when no dead-letter topic is configured: the failure is logged
/// and the message is dropped
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDeadLetterSink;

#[async_trait]
impl DeadLetterSink for LoggingDeadLetterSink {
    async fn send(&self, message: &ChannelMessage, reason: &str) -> Result<(), DeadLetterError> {
        error!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            payload = %String::from_utf8_lossy(&message.payload),
            reason,
            "Dropping unprocessable message"
        );
        Ok(())
    }
}
