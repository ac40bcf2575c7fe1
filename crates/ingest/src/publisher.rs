use std::time::Duration;

use async_trait::async_trait;
use matchflow_domain::LogRecord;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("{0}")]
pub struct PublishError(pub String);

/// Narrow capability the HTTP handler depends on: publish one record
/// and return once the log has durably acknowledged it. Kept as a
/// trait (rather than a concrete `FutureProducer` field on `AppState`)
/// so integration tests can substitute an in-memory fake and exercise
/// §8's end-to-end scenarios without a live Kafka cluster.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, record: &LogRecord) -> Result<(), PublishError>;
}

/// Publishes with `acks=all` and idempotent producer semantics, so a
/// successful publish satisfies the spec's durability invariant
/// (§4.1): the record survives single-node failure before the HTTP
/// handler returns 202.
pub struct KafkaPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(brokers: &str, timeout: Duration) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("message.timeout.ms", &timeout.as_millis().to_string())
            .create()?;

        Ok(KafkaPublisher { producer, timeout })
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, topic: &str, record: &LogRecord) -> Result<(), PublishError> {
        let mut headers = OwnedHeaders::new();
        for (key, value) in &record.headers {
            headers = headers.insert(Header {
                key,
                value: Some(value.as_slice()),
            });
        }

        let future_record = FutureRecord::to(topic)
            .key(&record.key)
            .payload(&record.value)
            .headers(headers);

        self.producer
            .send(future_record, self.timeout)
            .await
            .map(|_| ())
            .map_err(|(err, _owned_message)| PublishError(err.to_string()))
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fakes {
    use super::*;
    use std::sync::Mutex;

    /// In-memory stand-in used by the integration tests: records every
    /// publish per topic so a test can assert on ordering and content
    /// without a broker.
    #[derive(Default)]
    pub struct FakePublisher {
        pub topics: Mutex<std::collections::HashMap<String, Vec<LogRecord>>>,
        pub fail_next: Mutex<bool>,
    }

    #[async_trait]
    impl EventPublisher for FakePublisher {
        async fn publish(&self, topic: &str, record: &LogRecord) -> Result<(), PublishError> {
            let mut fail_next = self.fail_next.lock().unwrap();
            if *fail_next {
                *fail_next = false;
                return Err(PublishError("simulated publish failure".to_string()));
            }
            drop(fail_next);

            self.topics
                .lock()
                .unwrap()
                .entry(topic.to_string())
                .or_default()
                .push(record.clone());
            Ok(())
        }
    }
}
