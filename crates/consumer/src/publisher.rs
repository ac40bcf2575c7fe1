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

/// Narrow capability the retry-escalation path depends on: republish
/// one record to a named topic. Kept as a trait for the same reason as
/// the ingest service's `EventPublisher` — tests substitute an
/// in-memory fake and assert on what landed on `retry`/`dead` without a
/// live broker.
#[async_trait]
pub trait LogPublisher: Send + Sync {
    async fn publish(&self, topic: &str, record: &LogRecord) -> Result<(), PublishError>;
}

pub struct KafkaLogPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaLogPublisher {
    pub fn new(brokers: &str, timeout: Duration) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("message.timeout.ms", &timeout.as_millis().to_string())
            .create()?;

        Ok(KafkaLogPublisher { producer, timeout })
    }
}

#[async_trait]
impl LogPublisher for KafkaLogPublisher {
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

    #[derive(Default)]
    pub struct FakeLogPublisher {
        pub topics: Mutex<std::collections::HashMap<String, Vec<LogRecord>>>,
        pub fail_topics: Mutex<std::collections::HashSet<String>>,
    }

    #[async_trait]
    impl LogPublisher for FakeLogPublisher {
        async fn publish(&self, topic: &str, record: &LogRecord) -> Result<(), PublishError> {
            if self.fail_topics.lock().unwrap().contains(topic) {
                return Err(PublishError(format!("simulated failure publishing to {topic}")));
            }

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
