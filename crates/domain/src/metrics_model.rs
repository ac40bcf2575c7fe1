use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::EventType;

/// The minute-aligned window with the maximum total event count for a
/// match, as computed by summing per-type counts within each minute
/// bucket and taking the maximum (ties broken by earliest minute).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakMinute {
    pub minute: DateTime<Utc>,
    pub event_count: u64,
}

/// The aggregated response served from `GET /api/matches/{matchId}/metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetrics {
    pub match_id: String,
    pub total_events: u64,
    pub events_by_type: HashMap<EventType, u64>,
    pub goals: u64,
    pub yellow_cards: u64,
    pub red_cards: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_event_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_minute: Option<PeakMinute>,
}
