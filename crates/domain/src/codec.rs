use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::event::{Event, EventRequest, EventType};

pub const EVENT_TYPE_HEADER: &str = "event_type";
pub const EVENT_ID_HEADER: &str = "event_id";
pub const RETRY_COUNT_HEADER: &str = "retry_count";
pub const ORIGINAL_TIMESTAMP_HEADER: &str = "original_timestamp";

/// The transport envelope published to (and consumed from) the log.
///
/// `key` carries the `match_id` so the substrate's keyed partitioner
/// gives per-match ordering; `value` is the event serialized with the
/// same field names the HTTP API uses; `headers` carry small metadata
/// that does not belong in the JSON body (retry bookkeeping).
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub headers: Vec<(String, Vec<u8>)>,
}

impl LogRecord {
    /// Builds the record published for a freshly-accepted event.
    pub fn from_event(event: &Event) -> Result<Self, DomainError> {
        let wire: EventRequest = event.clone().into();
        let value = serde_json::to_vec(&wire).map_err(|e| DomainError::Codec(e.to_string()))?;

        Ok(LogRecord {
            key: event.match_id.as_bytes().to_vec(),
            value,
            headers: vec![
                (EVENT_TYPE_HEADER.to_string(), event.event_type.as_str().as_bytes().to_vec()),
                (EVENT_ID_HEADER.to_string(), event.event_id.to_string().into_bytes()),
                (RETRY_COUNT_HEADER.to_string(), vec![0u8]),
            ],
        })
    }

    fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_slice())
    }

    /// `retry_count` header value, defaulting to 0 when absent.
    pub fn retry_count(&self) -> u8 {
        self.header(RETRY_COUNT_HEADER)
            .and_then(|v| v.first().copied())
            .unwrap_or(0)
    }

    /// Decodes `value` back into a trusted [`Event`], re-running
    /// validation. A record that fails to parse here is a poison pill:
    /// malformed JSON (`DomainError::Codec`) or a value that no longer
    /// satisfies the domain invariants (`DomainError::Validation`).
    pub fn decode_event(&self) -> Result<Event, DomainError> {
        let text = std::str::from_utf8(&self.value)
            .map_err(|e| DomainError::Codec(e.to_string()))?;
        let wire: EventRequest =
            serde_json::from_str(text).map_err(|e| DomainError::Codec(e.to_string()))?;
        wire.validate()
    }

    /// Produces the record to republish onto the retry topic: same key
    /// and value, `retry_count` incremented, `original_timestamp` set
    /// the first time a record is retried.
    pub fn bumped_for_retry(&self, now: DateTime<Utc>) -> LogRecord {
        let mut headers: Vec<(String, Vec<u8>)> = self
            .headers
            .iter()
            .filter(|(k, _)| k != RETRY_COUNT_HEADER)
            .cloned()
            .collect();

        headers.push((RETRY_COUNT_HEADER.to_string(), vec![self.retry_count() + 1]));

        if self.header(ORIGINAL_TIMESTAMP_HEADER).is_none() {
            headers.push((
                ORIGINAL_TIMESTAMP_HEADER.to_string(),
                now.to_rfc3339().into_bytes(),
            ));
        }

        LogRecord {
            key: self.key.clone(),
            value: self.value.clone(),
            headers,
        }
    }
}

/// The terminal envelope published to the dead-letter topic once a
/// record exhausts its retry budget, or publishing to `retry` itself
/// fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEnvelope {
    pub event: EventRequest,
    pub failed_at: DateTime<Utc>,
    pub reason: String,
    pub event_id: Uuid,
    pub match_id: String,
    pub event_type: EventType,
}

impl DeadLetterEnvelope {
    pub fn new(event: &Event, reason: impl Into<String>, failed_at: DateTime<Utc>) -> Self {
        DeadLetterEnvelope {
            event: event.clone().into(),
            failed_at,
            reason: reason.into(),
            event_id: event.event_id,
            match_id: event.match_id.clone(),
            event_type: event.event_type,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DomainError> {
        serde_json::to_vec(self).map_err(|e| DomainError::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_event() -> Event {
        EventRequest {
            event_id: Uuid::new_v4().to_string(),
            match_id: "M1".to_string(),
            event_type: "goal".to_string(),
            timestamp: "2024-05-01T12:00:00Z".to_string(),
            team_id: 1,
            player_id: None,
            metadata: HashMap::new(),
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn from_event_keys_by_match_id() {
        let event = sample_event();
        let record = LogRecord::from_event(&event).unwrap();
        assert_eq!(record.key, b"M1".to_vec());
        assert_eq!(record.retry_count(), 0);
    }

    #[test]
    fn decode_event_round_trips() {
        let event = sample_event();
        let record = LogRecord::from_event(&event).unwrap();
        let decoded = record.decode_event().unwrap();
        assert_eq!(decoded.event_id, event.event_id);
        assert_eq!(decoded.match_id, event.match_id);
    }

    #[test]
    fn bumped_for_retry_increments_count_and_stamps_original_timestamp_once() {
        let event = sample_event();
        let record = LogRecord::from_event(&event).unwrap();
        let now = Utc::now();

        let retried_once = record.bumped_for_retry(now);
        assert_eq!(retried_once.retry_count(), 1);

        let retried_twice = retried_once.bumped_for_retry(now);
        assert_eq!(retried_twice.retry_count(), 2);

        // original_timestamp is set exactly once, not overwritten on
        // subsequent retries.
        let ts1 = retried_once.header(ORIGINAL_TIMESTAMP_HEADER).unwrap().to_vec();
        let ts2 = retried_twice.header(ORIGINAL_TIMESTAMP_HEADER).unwrap().to_vec();
        assert_eq!(ts1, ts2);
    }

    #[test]
    fn decode_event_rejects_non_json_payload() {
        let record = LogRecord {
            key: b"M1".to_vec(),
            value: b"not json at all".to_vec(),
            headers: vec![],
        };
        assert!(matches!(record.decode_event(), Err(DomainError::Codec(_))));
    }
}
