//! Channel consumer
//!
//! [`KafkaMessageSource`] subscribes once at construction and hands out one
//! owned [`ChannelMessage`] per poll. "No message within the timeout" is a
//! normal outcome, reported as `Ok(None)`.
//!
//! Offsets are committed only for acknowledged messages. Auto-commit is off;
//! acked positions are committed every [`DEFAULT_COMMIT_INTERVAL`] and once
//! more on close, so a message that stopped the processor is redelivered to
//! the group on restart.

use async_trait::async_trait;
use ketl_common::kafka::KafkaConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default consumer group.
pub const DEFAULT_GROUP_ID: &str = "ketl-processor";

/// Default wait for a message before reporting none.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(1000);

/// How often acknowledged offsets are committed while running.
pub const DEFAULT_COMMIT_INTERVAL: Duration = Duration::from_secs(5);

/// One record read from the channel, with its position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error("Kafka consumer error: {0}")]
    Kafka(#[from] KafkaError),

    #[error("Consumer is closed")]
    Closed,
}

/// Source of channel messages
#[async_trait]
pub trait MessageSource: Send {
    /// Wait up to `timeout` for the next message
    async fn poll(&mut self, timeout: Duration) -> Result<Option<ChannelMessage>, ConsumeError>;

    /// Mark `message` as handled; its offset may be committed from now on
    async fn ack(&mut self, message: &ChannelMessage) -> Result<(), ConsumeError>;

    /// Commit acknowledged offsets, leave the group and release the handle
    async fn close(&mut self);
}

/// Kafka consumer subscribed to the configured topics
pub struct KafkaMessageSource {
    consumer: Option<StreamConsumer>,
    /// Last acknowledged offset per (topic, partition)
    acked: HashMap<(String, i32), i64>,
    commit_interval: Duration,
    last_commit: Instant,
}

impl KafkaMessageSource {
    pub fn new(config: &KafkaConfig, group_id: &str) -> Result<Self, ConsumeError> {
        let consumer: StreamConsumer = config
            .client_config()
            .set("group.id", group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("enable.auto.commit", "false")
            .create()?;

        let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topics)?;

        info!(topics = ?topics, group_id, "Subscribed to channel");

        Ok(Self {
            consumer: Some(consumer),
            acked: HashMap::new(),
            commit_interval: DEFAULT_COMMIT_INTERVAL,
            last_commit: Instant::now(),
        })
    }

    /// Committed position is the offset after the last acked message
    fn acked_positions(&self) -> Result<TopicPartitionList, KafkaError> {
        let mut tpl = TopicPartitionList::new();
        for ((topic, partition), offset) in &self.acked {
            tpl.add_partition_offset(topic, *partition, Offset::Offset(offset + 1))?;
        }
        Ok(tpl)
    }

    fn commit(&mut self, mode: CommitMode) -> Result<(), ConsumeError> {
        let consumer = self.consumer.as_ref().ok_or(ConsumeError::Closed)?;
        if self.acked.is_empty() {
            return Ok(());
        }

        consumer.commit(&self.acked_positions()?, mode)?;
        debug!(partitions = self.acked.len(), "Committed acknowledged offsets");
        self.last_commit = Instant::now();
        Ok(())
    }
}

#[async_trait]
impl MessageSource for KafkaMessageSource {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<ChannelMessage>, ConsumeError> {
        let consumer = self.consumer.as_ref().ok_or(ConsumeError::Closed)?;

        match tokio::time::timeout(timeout, consumer.recv()).await {
            Ok(Ok(msg)) => match msg.payload() {
                Some(payload) => Ok(Some(ChannelMessage {
                    topic: msg.topic().to_string(),
                    partition: msg.partition(),
                    offset: msg.offset(),
                    payload: payload.to_vec(),
                })),
                None => {
                    debug!(
                        topic = msg.topic(),
                        partition = msg.partition(),
                        offset = msg.offset(),
                        "Skipping message without payload"
                    );
                    Ok(None)
                },
            },
            Ok(Err(e)) => Err(ConsumeError::Kafka(e)),
            Err(_) => Ok(None),
        }
    }

    async fn ack(&mut self, message: &ChannelMessage) -> Result<(), ConsumeError> {
        if self.consumer.is_none() {
            return Err(ConsumeError::Closed);
        }

        self.acked
            .insert((message.topic.clone(), message.partition), message.offset);

        if self.last_commit.elapsed() >= self.commit_interval {
            self.commit(CommitMode::Async)?;
        }
        Ok(())
    }

    async fn close(&mut self) {
        if self.consumer.is_none() {
            return;
        }

        if let Err(e) = self.commit(CommitMode::Sync) {
            warn!(error = %e, "Failed to commit final offsets");
        }
        if let Some(consumer) = self.consumer.take() {
            consumer.unsubscribe();
            info!("Consumer closed");
        }
    }
}
