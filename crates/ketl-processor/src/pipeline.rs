//! The processing loop
//!
//! Polls the channel and drives each message through parse, extract and
//! persist. Messages that fail a stage go to the dead-letter sink and the
//! loop moves on; a lost store connection or a failed dead-letter delivery
//! stops it. Cancellation is observed only between messages.
//!
//! A message is acknowledged to the source only once it is persisted or
//! dead-lettered; the one that stopped the loop is left for redelivery.

use ketl_common::ValidatedRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ProcessorConfig;
use crate::consumer::{ChannelMessage, KafkaMessageSource, MessageSource};
use crate::db::{load_ddl, PgReviewStore, ReviewStore};
use crate::dead_letter::{DeadLetterSink, KafkaDeadLetterSink, LoggingDeadLetterSink};
use crate::error::{ParseError, ProcessError, ProcessorError, ProcessorResult};
use crate::extract::extract;

/// Counters reported when the loop stops
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorStats {
    pub consumed: u64,
    pub persisted: u64,
    pub dead_lettered: u64,
}

/// Decode channel text into a validated record
pub fn parse_message(payload: &[u8]) -> Result<ValidatedRecord, ParseError> {
    Ok(ValidatedRecord::from_json(payload)?)
}

pub struct ProcessingLoop {
    source: Box<dyn MessageSource>,
    store: Box<dyn ReviewStore>,
    dead_letter: Arc<dyn DeadLetterSink>,
    poll_timeout: Duration,
}

impl ProcessingLoop {
    pub fn new(
        source: Box<dyn MessageSource>,
        store: Box<dyn ReviewStore>,
        dead_letter: Arc<dyn DeadLetterSink>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            source,
            store,
            dead_letter,
            poll_timeout,
        }
    }

    /// Ensure the schema, then process messages until `shutdown` is
    /// cancelled or a fatal error occurs. The consumer and the store are
    /// closed on every exit path.
    pub async fn run(mut self, shutdown: CancellationToken) -> ProcessorResult<ProcessorStats> {
        let result = self.run_until_stopped(&shutdown).await;

        self.source.close().await;
        self.store.close().await;

        match result {
            Ok(ref stats) => info!(
                consumed = stats.consumed,
                persisted = stats.persisted,
                dead_lettered = stats.dead_lettered,
                "Processing loop stopped"
            ),
            Err(ref e) => error!(error = %e, "Processing loop failed"),
        }
        result
    }

    async fn run_until_stopped(
        &mut self,
        shutdown: &CancellationToken,
    ) -> ProcessorResult<ProcessorStats> {
        self.store
            .ensure_schema()
            .await
            .map_err(ProcessorError::Schema)?;

        info!(poll_timeout = ?self.poll_timeout, "Processing loop running");

        let mut stats = ProcessorStats::default();

        loop {
            let polled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                polled = self.source.poll(self.poll_timeout) => polled,
            };

            let message = match polled {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "Poll failed");
                    continue;
                },
            };

            stats.consumed += 1;

            match self.process(&message).await {
                Ok(()) => stats.persisted += 1,
                Err(ProcessError::Persist(e)) if e.is_connection_failure() => {
                    return Err(ProcessorError::Persist(e));
                },
                Err(e) => {
                    warn!(
                        stage = e.stage(),
                        error = %e,
                        topic = %message.topic,
                        offset = message.offset,
                        "Message failed processing"
                    );
                    self.dead_letter.send(&message, &e.to_string()).await?;
                    stats.dead_lettered += 1;
                },
            }

            // a lost ack only means redelivery, and duplicates are dead-lettered
            if let Err(e) = self.source.ack(&message).await {
                warn!(error = %e, offset = message.offset, "Failed to acknowledge message");
            }
        }

        Ok(stats)
    }

    #[tracing::instrument(
        skip_all,
        fields(topic = %message.topic, partition = message.partition, offset = message.offset)
    )]
    async fn process(&mut self, message: &ChannelMessage) -> Result<(), ProcessError> {
        let record = parse_message(&message.payload)?;
        let row = extract(&record)?;
        self.store.persist(&row).await?;

        debug!(record_id = %row.id, "Row persisted");
        Ok(())
    }
}

/// Connect to the store and the channel, then run the loop until `shutdown`
///
/// A shutdown while the store is still connecting returns empty stats
/// without touching the channel.
pub async fn start(
    config: &ProcessorConfig,
    shutdown: CancellationToken,
) -> ProcessorResult<ProcessorStats> {
    let ddl = load_ddl(config.ddl_path.as_deref())?;

    let mut store = tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            info!("Shutdown requested while connecting to the store");
            return Ok(ProcessorStats::default());
        }
        connected = PgReviewStore::connect(&config.database, ddl) => connected?,
    };

    let (source, dead_letter) = match open_channel(config) {
        Ok(handles) => handles,
        Err(e) => {
            store.close().await;
            return Err(e);
        },
    };

    ProcessingLoop::new(Box::new(source), Box::new(store), dead_letter, config.poll_timeout)
        .run(shutdown)
        .await
}

fn open_channel(
    config: &ProcessorConfig,
) -> ProcessorResult<(KafkaMessageSource, Arc<dyn DeadLetterSink>)> {
    let source = KafkaMessageSource::new(&config.kafka, &config.group_id)?;

    let dead_letter: Arc<dyn DeadLetterSink> = match config.dlq_topic {
        Some(ref topic) => {
            info!(dlq_topic = %topic, "Dead-lettering to Kafka");
            Arc::new(KafkaDeadLetterSink::new(
                &config.kafka,
                topic.as_str(),
                config.delivery_timeout,
            )?)
        },
        None => {
            warn!("KAFKA_DLQ_TOPIC not set, unprocessable messages will only be logged");
            Arc::new(LoggingDeadLetterSink)
        },
    };

    Ok((source, dead_letter))
}
