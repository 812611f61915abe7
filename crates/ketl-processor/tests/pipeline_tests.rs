//! Integration tests for the processing loop
//!
//! These tests verify:
//! - Valid messages become rows in channel order
//! - Parse, extraction and statement failures are dead-lettered and the loop
//!   keeps going
//! - Connection loss and dead-letter failures stop the loop
//! - Consumer and store are closed on every exit path
//! - Only persisted or dead-lettered messages are acknowledged

mod common;

use common::{
    init_test_tracing, review_json, valid_review, InMemoryChannel, InMemorySource, InMemoryStore,
    RecordingDeadLetters, TEST_TOPIC,
};
use ketl_processor::db::PersistError;
use ketl_processor::{ProcessingLoop, ProcessorError, ProcessorStats};
use rdkafka::error::RDKafkaErrorCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const POLL_TIMEOUT: Duration = Duration::from_millis(10);

struct Harness {
    channel: InMemoryChannel,
    store: InMemoryStore,
    dead_letters: RecordingDeadLetters,
    acked: Arc<Mutex<Vec<i64>>>,
}

impl Harness {
    fn new() -> Self {
        init_test_tracing();
        Self {
            channel: InMemoryChannel::default(),
            store: InMemoryStore::default(),
            dead_letters: RecordingDeadLetters::default(),
            acked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn acked(&self) -> Vec<i64> {
        self.acked.lock().unwrap().clone()
    }

    fn with_dead_letters(mut self, dead_letters: RecordingDeadLetters) -> Self {
        self.dead_letters = dead_letters;
        self
    }

    /// Run until the channel is drained; returns the result and whether the
    /// source was closed afterwards
    async fn run(&self) -> (Result<ProcessorStats, ProcessorError>, bool) {
        let shutdown = CancellationToken::new();
        self.run_with(self.store.clone(), shutdown).await
    }

    async fn run_with(
        &self,
        store: InMemoryStore,
        shutdown: CancellationToken,
    ) -> (Result<ProcessorStats, ProcessorError>, bool) {
        let source = InMemorySource::new(self.channel.clone()).stop_when_drained(shutdown.clone());
        let source_closed = source.closed_flag();
        let acked = source.acked_offsets();

        let processing = ProcessingLoop::new(
            Box::new(source),
            Box::new(store),
            Arc::new(self.dead_letters.clone()),
            POLL_TIMEOUT,
        );

        let result = processing.run(shutdown).await;
        self.acked.lock().unwrap().extend(acked.lock().unwrap().iter().copied());
        let closed = *source_closed.lock().unwrap();
        (result, closed)
    }
}

#[tokio::test]
async fn test_valid_messages_are_persisted_in_order() {
    let harness = Harness::new();
    harness.channel.push_json(&valid_review("00000000000000000000000000000001"));
    harness.channel.push_json(&valid_review("00000000000000000000000000000002"));

    let (result, source_closed) = harness.run().await;
    let stats = result.unwrap();

    assert_eq!(
        stats,
        ProcessorStats {
            consumed: 2,
            persisted: 2,
            dead_lettered: 0
        }
    );

    let rows = harness.store.rows();
    assert_eq!(rows[0].id, "00000000000000000000000000000001");
    assert_eq!(rows[1].id, "00000000000000000000000000000002");
    assert_eq!(rows[0].brand, "honda");
    assert_eq!(rows[0].city, "malibu");

    assert_eq!(harness.store.schema_applied(), 1);
    assert!(harness.store.is_closed());
    assert!(source_closed);
    assert_eq!(harness.acked(), vec![0, 1]);
}

#[tokio::test]
async fn test_malformed_message_is_dead_lettered_and_loop_continues() {
    let harness = Harness::new();
    harness.channel.push_payload("{not json");
    harness.channel.push_json(&valid_review("00000000000000000000000000000003"));

    let (result, _) = harness.run().await;
    let stats = result.unwrap();

    assert_eq!(stats.consumed, 2);
    assert_eq!(stats.persisted, 1);
    assert_eq!(stats.dead_lettered, 1);

    let received = harness.dead_letters.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0.payload, b"{not json".to_vec());
    assert_eq!(received[0].0.topic, TEST_TOPIC);
    assert_eq!(received[0].0.offset, 0);
    assert!(received[0].1.starts_with("Message is not a valid record"));
}

#[tokio::test]
async fn test_address_arity_failure_is_dead_lettered() {
    let harness = Harness::new();
    harness.channel.push_json(&review_json(
        "00000000000000000000000000000004",
        "10880 Malibu Point, 90265, Florida, USA",
    ));

    let (result, _) = harness.run().await;
    let stats = result.unwrap();

    assert_eq!(stats.dead_lettered, 1);
    assert!(harness.store.rows().is_empty());

    let (message, reason) = &harness.dead_letters.received()[0];
    assert_eq!(message.offset, 0);
    assert_eq!(
        reason,
        "Field 'address' must have 5 comma-separated parts, found 4"
    );
}

#[tokio::test]
async fn test_statement_failure_is_dead_lettered() {
    let harness = Harness::new();
    harness.channel.push_json(&valid_review("00000000000000000000000000000005"));
    harness.channel.push_json(&valid_review("00000000000000000000000000000005"));
    harness.channel.push_json(&valid_review("00000000000000000000000000000006"));

    let (result, _) = harness.run().await;
    let stats = result.unwrap();

    assert_eq!(
        stats,
        ProcessorStats {
            consumed: 3,
            persisted: 2,
            dead_lettered: 1
        }
    );
    let received = harness.dead_letters.received();
    assert_eq!(received[0].0.offset, 1);
    assert!(received[0].1.contains("review_pkey"));

    // dead-lettered messages are acknowledged like persisted ones
    assert_eq!(harness.acked(), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_connection_failure_is_fatal() {
    let harness = Harness::new();
    harness.store.fail_next(PersistError::Connection("connection reset by peer".to_string()));
    harness.channel.push_json(&valid_review("00000000000000000000000000000007"));
    harness.channel.push_json(&valid_review("00000000000000000000000000000008"));

    let (result, source_closed) = harness.run().await;

    assert!(matches!(result, Err(ProcessorError::Persist(PersistError::Connection(_)))));
    assert!(harness.dead_letters.received().is_empty());
    assert_eq!(harness.channel.pending(), 1);
    assert!(harness.store.is_closed());
    assert!(source_closed);
}

#[tokio::test]
async fn test_message_behind_connection_failure_is_not_acknowledged() {
    let harness = Harness::new();
    harness.channel.push_json(&valid_review("00000000000000000000000000000010"));
    harness.channel.push_json(&valid_review("00000000000000000000000000000011"));
    harness.store.fail_next(PersistError::Statement("value too long".to_string()));
    harness.store.fail_next(PersistError::Connection("server closed the connection".to_string()));

    let (result, _) = harness.run().await;

    assert!(matches!(result, Err(ProcessorError::Persist(PersistError::Connection(_)))));
    // offset 0 was dead-lettered; offset 1 must be redelivered
    assert_eq!(harness.acked(), vec![0]);
    assert!(harness.store.rows().is_empty());
}

#[tokio::test]
async fn test_dead_letter_failure_is_fatal() {
    let harness = Harness::new().with_dead_letters(RecordingDeadLetters::failing());
    harness.channel.push_payload("garbage");
    harness.channel.push_json(&valid_review("00000000000000000000000000000009"));

    let (result, source_closed) = harness.run().await;

    assert!(matches!(result, Err(ProcessorError::DeadLetter(_))));
    assert!(harness.store.rows().is_empty());
    assert!(harness.store.is_closed());
    assert!(source_closed);
    assert!(harness.acked().is_empty());
}

#[tokio::test]
async fn test_broker_error_on_poll_is_transient() {
    let harness = Harness::new();
    harness.channel.push_broker_error(RDKafkaErrorCode::BrokerTransportFailure);
    harness.channel.push_json(&valid_review("0000000000000000000000000000000a"));

    let (result, _) = harness.run().await;
    let stats = result.unwrap();

    assert_eq!(stats.consumed, 1);
    assert_eq!(stats.persisted, 1);
    assert_eq!(harness.acked(), vec![0]);
}

#[tokio::test]
async fn test_schema_failure_stops_before_consuming() {
    let harness = Harness::new();
    harness.store.fail_schema(PersistError::Statement("permission denied for schema public".to_string()));
    harness.channel.push_json(&valid_review("0000000000000000000000000000000b"));

    let (result, source_closed) = harness.run().await;

    assert!(matches!(result, Err(ProcessorError::Schema(_))));
    assert_eq!(harness.channel.pending(), 1);
    assert!(harness.store.is_closed());
    assert!(source_closed);
}

#[tokio::test]
async fn test_shutdown_before_first_poll() {
    let harness = Harness::new();
    harness.channel.push_json(&valid_review("0000000000000000000000000000000c"));

    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let (result, source_closed) = harness.run_with(harness.store.clone(), shutdown).await;

    assert_eq!(result.unwrap(), ProcessorStats::default());
    assert_eq!(harness.store.schema_applied(), 1);
    assert_eq!(harness.channel.pending(), 1);
    assert!(harness.store.is_closed());
    assert!(source_closed);
}

#[tokio::test]
async fn test_in_flight_message_finishes_before_shutdown() {
    let harness = Harness::new();
    harness.channel.push_json(&valid_review("0000000000000000000000000000000d"));
    harness.channel.push_json(&valid_review("0000000000000000000000000000000e"));

    let shutdown = CancellationToken::new();
    let store = harness.store.clone().cancel_on_persist(shutdown.clone());

    let (result, _) = harness.run_with(store, shutdown).await;
    let stats = result.unwrap();

    assert_eq!(stats.consumed, 1);
    assert_eq!(stats.persisted, 1);
    assert_eq!(harness.store.rows().len(), 1);
    assert_eq!(harness.channel.pending(), 1);
}
