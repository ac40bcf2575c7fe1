use chrono::Utc;
use matchflow_domain::{DeadLetterEnvelope, Event, LogRecord};
use tracing::{error, warn};

use crate::metrics::Metrics;
use crate::publisher::LogPublisher;

/// Runs the retry-escalation protocol over one failed batch. Every
/// record is terminally handled by the time this returns — either
/// requeued on `retry`, wrapped and sent to `dead`, or logged as lost —
/// so the caller always commits the original offsets afterward.
pub async fn escalate(
    events: &[Event],
    records: &[LogRecord],
    reason: &str,
    retry_topic: &str,
    dead_topic: &str,
    max_retries: u8,
    publisher: &dyn LogPublisher,
    metrics: &Metrics,
) {
    let now = Utc::now();

    for (event, record) in events.iter().zip(records.iter()) {
        let new_count = record.retry_count().saturating_add(1);

        if new_count <= max_retries {
            let retried = record.bumped_for_retry(now);
            match publisher.publish(retry_topic, &retried).await {
                Ok(()) => {
                    metrics.retried.inc();
                    continue;
                }
                Err(e) => {
                    warn!(
                        event_id = %event.event_id,
                        retry_count = new_count,
                        error = %e,
                        "retry publish failed, falling through to dead-letter"
                    );
                }
            }
        }

        let envelope = DeadLetterEnvelope::new(event, reason, now);
        let dead_record = match envelope.to_bytes() {
            Ok(value) => LogRecord {
                key: record.key.clone(),
                value,
                headers: Vec::new(),
            },
            Err(e) => {
                error!(event_id = %event.event_id, error = %e, "failed to encode dead-letter envelope");
                metrics.dead_letter_drop.inc();
                continue;
            }
        };

        match publisher.publish(dead_topic, &dead_record).await {
            Ok(()) => metrics.dead_lettered.inc(),
            Err(e) => {
                error!(
                    event_id = %event.event_id,
                    match_id = %event.match_id,
                    error = %e,
                    "dead-letter publish failed, event is lost"
                );
                metrics.dead_letter_drop.inc();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::fakes::FakeLogPublisher;
    use matchflow_domain::EventRequest;
    use std::collections::HashMap;

    fn sample() -> (Event, LogRecord) {
        let event = EventRequest {
            event_id: uuid::Uuid::new_v4().to_string(),
            match_id: "M1".to_string(),
            event_type: "goal".to_string(),
            timestamp: "2024-05-01T12:00:00Z".to_string(),
            team_id: 1,
            player_id: None,
            metadata: HashMap::new(),
        }
        .validate()
        .unwrap();
        let record = LogRecord::from_event(&event).unwrap();
        (event, record)
    }

    #[tokio::test]
    async fn republishes_to_retry_under_the_limit() {
        let (event, record) = sample();
        let publisher = FakeLogPublisher::default();
        let metrics = Metrics::new().unwrap();

        escalate(&[event], &[record], "store down", "retry", "dead", 3, &publisher, &metrics).await;

        let topics = publisher.topics.lock().unwrap();
        assert_eq!(topics.get("retry").map(|v| v.len()), Some(1));
        assert!(topics.get("dead").is_none());
        assert_eq!(metrics.retried.get(), 1);
    }

    #[tokio::test]
    async fn dead_letters_once_retries_exhausted() {
        let (event, mut record) = sample();
        for _ in 0..3 {
            record = record.bumped_for_retry(Utc::now());
        }
        assert_eq!(record.retry_count(), 3);

        let publisher = FakeLogPublisher::default();
        let metrics = Metrics::new().unwrap();

        escalate(&[event], &[record], "store down", "retry", "dead", 3, &publisher, &metrics).await;

        let topics = publisher.topics.lock().unwrap();
        assert!(topics.get("retry").is_none());
        assert_eq!(topics.get("dead").map(|v| v.len()), Some(1));
        assert_eq!(metrics.dead_lettered.get(), 1);
    }

    #[tokio::test]
    async fn falls_through_to_dead_letter_when_retry_publish_fails() {
        let (event, record) = sample();
        let publisher = FakeLogPublisher::default();
        publisher.fail_topics.lock().unwrap().insert("retry".to_string());
        let metrics = Metrics::new().unwrap();

        escalate(&[event], &[record], "store down", "retry", "dead", 3, &publisher, &metrics).await;

        let topics = publisher.topics.lock().unwrap();
        assert!(topics.get("retry").is_none());
        assert_eq!(topics.get("dead").map(|v| v.len()), Some(1));
    }

    #[tokio::test]
    async fn counts_a_loud_drop_when_dead_letter_publish_also_fails() {
        let (event, mut record) = sample();
        for _ in 0..3 {
            record = record.bumped_for_retry(Utc::now());
        }

        let publisher = FakeLogPublisher::default();
        publisher.fail_topics.lock().unwrap().insert("dead".to_string());
        let metrics = Metrics::new().unwrap();

        escalate(&[event], &[record], "store down", "retry", "dead", 3, &publisher, &metrics).await;

        assert_eq!(metrics.dead_letter_drop.get(), 1);
        assert_eq!(metrics.dead_lettered.get(), 0);
    }
}
