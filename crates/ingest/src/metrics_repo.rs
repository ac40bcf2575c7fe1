use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use clickhouse::{Client, Row};
use matchflow_domain::{EventType, MatchMetrics, PeakMinute};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("{0}")]
pub struct StoreError(pub String);

#[derive(Debug, Row, Deserialize)]
struct SummaryRow {
    total_events: u64,
    goals: u64,
    yellow_cards: u64,
    red_cards: u64,
    first_event_at: i64,
    last_event_at: i64,
}

#[derive(Debug, Row, Deserialize)]
struct TypeCountRow {
    event_type: String,
    count: u64,
}

#[derive(Debug, Row, Deserialize)]
struct MinuteCountRow {
    minute_epoch_secs: i64,
    count: u64,
}

/// Narrow capability the metrics handler depends on. Kept separate
/// from the batch consumer's store-writer trait: this side only ever
/// reads, and its queries are match-scoped aggregations rather than
/// bulk inserts.
#[async_trait]
pub trait MetricsRepository: Send + Sync {
    async fn match_metrics(&self, match_id: &str) -> Result<Option<MatchMetrics>, StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

pub struct ClickHouseMetricsRepository {
    client: Client,
    table: String,
}

impl ClickHouseMetricsRepository {
    pub fn new(url: &str, database: &str, user: &str, password: &str) -> Self {
        let mut client = Client::default()
            .with_url(url)
            .with_database(database)
            .with_user(user);
        if !password.is_empty() {
            client = client.with_password(password);
        }

        ClickHouseMetricsRepository {
            client,
            table: "match_events".to_string(),
        }
    }

    async fn summary(&self, match_id: &str) -> Result<SummaryRow, StoreError> {
        let sql = format!(
            "SELECT \
                count() AS total_events, \
                countIf(event_type = 'goal') AS goals, \
                countIf(event_type = 'yellow_card') AS yellow_cards, \
                countIf(event_type = 'red_card') AS red_cards, \
                toUnixTimestamp(min(timestamp)) AS first_event_at, \
                toUnixTimestamp(max(timestamp)) AS last_event_at \
             FROM {} WHERE match_id = ?",
            self.table
        );

        self.client
            .query(&sql)
            .bind(match_id)
            .fetch_one::<SummaryRow>()
            .await
            .map_err(|e| StoreError(e.to_string()))
    }

    async fn by_type(&self, match_id: &str) -> Result<Vec<TypeCountRow>, StoreError> {
        let sql = format!(
            "SELECT event_type, count() AS count FROM {} WHERE match_id = ? \
             GROUP BY event_type ORDER BY count DESC",
            self.table
        );

        self.client
            .query(&sql)
            .bind(match_id)
            .fetch_all::<TypeCountRow>()
            .await
            .map_err(|e| StoreError(e.to_string()))
    }

    async fn per_minute(&self, match_id: &str) -> Result<Vec<MinuteCountRow>, StoreError> {
        let sql = format!(
            "SELECT toUnixTimestamp(toStartOfMinute(timestamp)) AS minute_epoch_secs, \
                    count() AS count \
             FROM {} WHERE match_id = ? \
             GROUP BY minute_epoch_secs ORDER BY minute_epoch_secs",
            self.table
        );

        self.client
            .query(&sql)
            .bind(match_id)
            .fetch_all::<MinuteCountRow>()
            .await
            .map_err(|e| StoreError(e.to_string()))
    }
}

#[async_trait]
impl MetricsRepository for ClickHouseMetricsRepository {
    async fn match_metrics(&self, match_id: &str) -> Result<Option<MatchMetrics>, StoreError> {
        let summary = self.summary(match_id).await?;
        if summary.total_events == 0 {
            return Ok(None);
        }

        let by_type = self.by_type(match_id).await?;
        let mut events_by_type: HashMap<EventType, u64> = HashMap::new();
        for row in by_type {
            if let Ok(kind) = row.event_type.parse::<EventType>() {
                events_by_type.insert(kind, row.count);
            }
        }

        // A failure on the per-minute follow-up degrades gracefully:
        // the summary is still returned, just without a peak minute.
        let peak_minute = match self.per_minute(match_id).await {
            Ok(rows) => compute_peak(&rows),
            Err(_) => None,
        };

        Ok(Some(MatchMetrics {
            match_id: match_id.to_string(),
            total_events: summary.total_events,
            events_by_type,
            goals: summary.goals,
            yellow_cards: summary.yellow_cards,
            red_cards: summary.red_cards,
            first_event_at: epoch_to_utc(summary.first_event_at),
            last_event_at: epoch_to_utc(summary.last_event_at),
            peak_minute,
        }))
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

fn epoch_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    Utc.timestamp_opt(secs, 0).single()
}

/// Already per-minute, per-type rows have been collapsed (server-side
/// `GROUP BY minute`) into a single count per minute by the SQL above,
/// so the peak is simply the row with the maximum count; ties are
/// broken by the earliest minute because rows arrive ordered by
/// `minute_epoch_secs` and we only replace the running max on a strict
/// improvement.
fn compute_peak(rows: &[MinuteCountRow]) -> Option<PeakMinute> {
    let mut best: Option<&MinuteCountRow> = None;
    for row in rows {
        if best.map(|b| row.count > b.count).unwrap_or(true) {
            best = Some(row);
        }
    }

    best.and_then(|row| {
        epoch_to_utc(row.minute_epoch_secs).map(|minute| PeakMinute {
            minute,
            event_count: row.count,
        })
    })
}

#[cfg(any(test, feature = "test-support"))]
pub mod fakes {
    use super::*;
    use std::sync::Mutex;

    /// In-memory stand-in used by the integration tests: returns
    /// whatever the test pre-seeded for a given match id, and can be
    /// made to fail the next call to exercise the 500 path.
    #[derive(Default)]
    pub struct FakeMetricsRepository {
        pub matches: Mutex<HashMap<String, MatchMetrics>>,
        pub fail_next: Mutex<bool>,
    }

    #[async_trait]
    impl MetricsRepository for FakeMetricsRepository {
        async fn match_metrics(&self, match_id: &str) -> Result<Option<MatchMetrics>, StoreError> {
            let mut fail_next = self.fail_next.lock().unwrap();
            if *fail_next {
                *fail_next = false;
                return Err(StoreError("simulated store failure".to_string()));
            }
            drop(fail_next);

            Ok(self.matches.lock().unwrap().get(match_id).cloned())
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_picks_earliest_minute_on_tie() {
        let rows = vec![
            MinuteCountRow { minute_epoch_secs: 100, count: 8 },
            MinuteCountRow { minute_epoch_secs: 160, count: 8 },
            MinuteCountRow { minute_epoch_secs: 220, count: 3 },
        ];
        let peak = compute_peak(&rows).unwrap();
        assert_eq!(peak.event_count, 8);
        assert_eq!(peak.minute, epoch_to_utc(100).unwrap());
    }

    #[test]
    fn peak_is_none_for_empty_rows() {
        assert!(compute_peak(&[]).is_none());
    }
}
