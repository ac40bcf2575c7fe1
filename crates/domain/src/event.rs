use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// The closed set of match event kinds. The wire representation is the
/// snake_case variant name; anything else (including a different case,
/// e.g. `"GOAL"` or `"Goal"`) is rejected by `EventType::from_str`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Pass,
    Shot,
    Goal,
    Foul,
    YellowCard,
    RedCard,
    Substitution,
    Offside,
    Corner,
    FreeKick,
    Interception,
}

impl EventType {
    pub const ALL: [EventType; 11] = [
        EventType::Pass,
        EventType::Shot,
        EventType::Goal,
        EventType::Foul,
        EventType::YellowCard,
        EventType::RedCard,
        EventType::Substitution,
        EventType::Offside,
        EventType::Corner,
        EventType::FreeKick,
        EventType::Interception,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Pass => "pass",
            EventType::Shot => "shot",
            EventType::Goal => "goal",
            EventType::Foul => "foul",
            EventType::YellowCard => "yellow_card",
            EventType::RedCard => "red_card",
            EventType::Substitution => "substitution",
            EventType::Offside => "offside",
            EventType::Corner => "corner",
            EventType::FreeKick => "free_kick",
            EventType::Interception => "interception",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|variant| variant.as_str() == s)
            .ok_or(())
    }
}

/// The raw shape accepted on `POST /api/events`, before validation.
/// Every field stays a primitive (string/number) so validation can be
/// driven field-by-field in the order the spec prescribes, rather than
/// leaning on serde to reject out-of-range values with an opaque error.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    pub event_id: String,
    pub match_id: String,
    pub event_type: String,
    pub timestamp: String,
    pub team_id: i64,
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A validated, trusted event. Constructed only via [`EventRequest::validate`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_id: Uuid,
    pub match_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub team_id: u8,
    pub player_id: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventRequest {
    /// Validates fields in the order the spec mandates, short-circuiting
    /// on the first failure: `event_id` UUID parse, `match_id`
    /// non-empty, `event_type` enum membership, `timestamp` RFC3339
    /// parse, `team_id` membership in `{1, 2}`.
    pub fn validate(self) -> Result<Event, DomainError> {
        let event_id = Uuid::parse_str(&self.event_id).map_err(|_| {
            DomainError::validation("eventId", format!("invalid UUID: {}", self.event_id))
        })?;

        if self.match_id.trim().is_empty() {
            return Err(DomainError::validation(
                "matchId",
                "matchId must not be empty",
            ));
        }

        let event_type = EventType::from_str(&self.event_type).map_err(|_| {
            DomainError::validation(
                "eventType",
                format!("unknown event type: {}", self.event_type),
            )
        })?;

        // chrono's RFC3339 parser already accepts the nanosecond-precision
        // variant (`RFC3339Nano`) as well as the second-precision one, so
        // a single parse covers both layouts the spec distinguishes.
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| {
                DomainError::validation(
                    "timestamp",
                    format!("invalid RFC3339 timestamp: {}", self.timestamp),
                )
            })?;

        if self.team_id != 1 && self.team_id != 2 {
            return Err(DomainError::validation(
                "teamId",
                format!("teamId must be 1 or 2, got {}", self.team_id),
            ));
        }

        let player_id = self.player_id.filter(|p| !p.is_empty());

        Ok(Event {
            event_id,
            match_id: self.match_id,
            event_type,
            timestamp,
            team_id: self.team_id as u8,
            player_id,
            metadata: self.metadata,
        })
    }
}

impl From<Event> for EventRequest {
    fn from(event: Event) -> Self {
        EventRequest {
            event_id: event.event_id.to_string(),
            match_id: event.match_id,
            event_type: event.event_type.as_str().to_string(),
            timestamp: event.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
            team_id: event.team_id as i64,
            player_id: event.player_id,
            metadata: event.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> EventRequest {
        EventRequest {
            event_id: Uuid::new_v4().to_string(),
            match_id: "M1".to_string(),
            event_type: "goal".to_string(),
            timestamp: "2024-05-01T12:00:00.123456789Z".to_string(),
            team_id: 1,
            player_id: Some("p10".to_string()),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn accepts_all_eleven_event_types() {
        for variant in EventType::ALL {
            let mut req = valid_request();
            req.event_type = variant.as_str().to_string();
            let event = req.validate().expect("should validate");
            assert_eq!(event.event_type, variant);
        }
    }

    #[test]
    fn rejects_wrong_case_event_type() {
        for bad in ["GOAL", "Goal", "gOal"] {
            let mut req = valid_request();
            req.event_type = bad.to_string();
            let err = req.validate().unwrap_err();
            assert_eq!(err.field(), "eventType");
        }
    }

    #[test]
    fn rejects_invalid_event_id() {
        let mut req = valid_request();
        req.event_id = "not-a-uuid".to_string();
        let err = req.validate().unwrap_err();
        assert_eq!(err.field(), "eventId");
    }

    #[test]
    fn rejects_empty_match_id() {
        let mut req = valid_request();
        req.match_id = "".to_string();
        let err = req.validate().unwrap_err();
        assert_eq!(err.field(), "matchId");
    }

    #[test]
    fn rejects_out_of_range_team_id() {
        for bad in [0, 3, -1] {
            let mut req = valid_request();
            req.team_id = bad;
            let err = req.validate().unwrap_err();
            assert_eq!(err.field(), "teamId");
        }
    }

    #[test]
    fn rejects_non_rfc3339_timestamps() {
        for bad in ["invalid-date", "2021-01-01", "1609459200"] {
            let mut req = valid_request();
            req.timestamp = bad.to_string();
            let err = req.validate().unwrap_err();
            assert_eq!(err.field(), "timestamp");
        }
    }

    #[test]
    fn empty_player_id_is_treated_as_absent() {
        let mut req = valid_request();
        req.player_id = Some("".to_string());
        let event = req.validate().unwrap();
        assert_eq!(event.player_id, None);
    }

    #[test]
    fn round_trips_through_event_request() {
        let req = valid_request();
        let event = req.validate().unwrap();
        let back: EventRequest = event.clone().into();
        let event2 = back.validate().unwrap();
        assert_eq!(event.event_id, event2.event_id);
        assert_eq!(event.match_id, event2.match_id);
        assert_eq!(event.event_type, event2.event_type);
        assert_eq!(event.team_id, event2.team_id);
        // RFC3339-nano round trip is exact to the nanosecond.
        assert_eq!(event.timestamp, event2.timestamp);
    }
}
