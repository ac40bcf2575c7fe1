use std::time::{Duration, Instant};

use matchflow_domain::{Event, LogRecord};

/// The log coordinates of one fetched record, kept alongside its
/// decoded payload so the batch can commit offsets after a flush
/// without holding onto the borrowed Kafka message across iterations.
#[derive(Debug, Clone)]
pub struct Offset {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Two parallel slices grow together — one of decoded events (destined
/// for the store), one of the source records plus their log coordinates
/// (needed to commit offsets and to rebuild retry/dead-letter envelopes
/// on failure). `take` swaps both out atomically so new records can
/// keep accumulating in a fresh buffer without blocking on the flush
/// that follows.
pub struct EventBatch {
    events: Vec<Event>,
    records: Vec<LogRecord>,
    offsets: Vec<Offset>,
    last_flush: Instant,
}

impl Default for EventBatch {
    fn default() -> Self {
        EventBatch {
            events: Vec::new(),
            records: Vec::new(),
            offsets: Vec::new(),
            last_flush: Instant::now(),
        }
    }
}

impl EventBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, event: Event, record: LogRecord, offset: Offset) {
        self.events.push(event);
        self.records.push(record);
        self.offsets.push(offset);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn should_flush(&self, batch_size: usize, flush_interval: Duration) -> bool {
        self.events.len() >= batch_size || self.last_flush.elapsed() >= flush_interval
    }

    /// Snapshots the buffer and resets it for fresh accumulation. Resets
    /// the flush timer regardless of whether anything was buffered, so
    /// an idle consumer doesn't immediately re-trip the interval check.
    pub fn take(&mut self) -> (Vec<Event>, Vec<LogRecord>, Vec<Offset>) {
        self.last_flush = Instant::now();
        (
            std::mem::take(&mut self.events),
            std::mem::take(&mut self.records),
            std::mem::take(&mut self.offsets),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchflow_domain::EventRequest;
    use std::collections::HashMap;

    fn sample() -> (Event, LogRecord, Offset) {
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
        let offset = Offset { topic: "events".to_string(), partition: 0, offset: 1 };
        (event, record, offset)
    }

    #[test]
    fn flushes_on_size_threshold() {
        let mut batch = EventBatch::new();
        for _ in 0..3 {
            let (e, r, o) = sample();
            batch.add(e, r, o);
        }
        assert!(!batch.should_flush(5, Duration::from_secs(60)));
        assert!(batch.should_flush(3, Duration::from_secs(60)));
    }

    #[test]
    fn take_resets_buffer_and_timer() {
        let mut batch = EventBatch::new();
        let (e, r, o) = sample();
        batch.add(e, r, o);

        let (events, records, offsets) = batch.take();
        assert_eq!(events.len(), 1);
        assert_eq!(records.len(), 1);
        assert_eq!(offsets.len(), 1);
        assert!(batch.is_empty());
    }
}
