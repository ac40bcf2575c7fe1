use async_trait::async_trait;
use clickhouse::{Client, Row};
use matchflow_domain::Event;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Narrow capability the flush path depends on: bulk-insert a batch of
/// events. Kept separate from the ingest service's read-only
/// `MetricsRepository` — this side only ever writes.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_batch(&self, events: &[Event]) -> Result<(), StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Row, Serialize)]
struct EventRow<'a> {
    event_id: String,
    match_id: &'a str,
    event_type: &'a str,
    timestamp: i64,
    team_id: u8,
    player_id: Option<&'a str>,
    metadata: String,
}

impl<'a> EventRow<'a> {
    fn from_event(event: &'a Event) -> Result<Self, StoreError> {
        Ok(EventRow {
            event_id: event.event_id.to_string(),
            match_id: &event.match_id,
            event_type: event.event_type.as_str(),
            timestamp: event.timestamp.timestamp_millis(),
            team_id: event.team_id,
            player_id: event.player_id.as_deref(),
            metadata: serde_json::to_string(&event.metadata)
                .map_err(|e| StoreError(e.to_string()))?,
        })
    }
}

pub struct ClickHouseEventStore {
    client: Client,
    table: String,
}

impl ClickHouseEventStore {
    pub fn new(url: &str, database: &str, user: &str, password: &str) -> Self {
        let mut client = Client::default()
            .with_url(url)
            .with_database(database)
            .with_user(user);
        if !password.is_empty() {
            client = client.with_password(password);
        }

        ClickHouseEventStore {
            client,
            table: "match_events".to_string(),
        }
    }
}

#[async_trait]
impl EventStore for ClickHouseEventStore {
    async fn insert_batch(&self, events: &[Event]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut insert = self
            .client
            .insert(&self.table)
            .map_err(|e| StoreError(e.to_string()))?;

        for event in events {
            let row = EventRow::from_event(event)?;
            insert.write(&row).await.map_err(|e| StoreError(e.to_string()))?;
        }

        insert.end().await.map_err(|e| StoreError(e.to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.client
            .query("SELECT 1")
            .fetch_one::<u8>()
            .await
            .map(|_| ())
            .map_err(|e| StoreError(e.to_string()))
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fakes {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeEventStore {
        pub events: Mutex<Vec<Event>>,
        pub fail_next: Mutex<bool>,
    }

    #[async_trait]
    impl EventStore for FakeEventStore {
        async fn insert_batch(&self, events: &[Event]) -> Result<(), StoreError> {
            let mut fail_next = self.fail_next.lock().unwrap();
            if *fail_next {
                *fail_next = false;
                return Err(StoreError("simulated store failure".to_string()));
            }
            drop(fail_next);

            self.events.lock().unwrap().extend_from_slice(events);
            Ok(())
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }
}
