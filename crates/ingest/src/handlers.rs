use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use matchflow_domain::{DomainError, EventRequest, LogRecord};
use serde::Serialize;
use serde_json::json;

use crate::config::Config;
use crate::error::IngestError;
use crate::metrics::Metrics;
use crate::metrics_repo::MetricsRepository;
use crate::publisher::EventPublisher;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub publisher: Arc<dyn EventPublisher>,
    pub metrics_repo: Arc<dyn MetricsRepository>,
    pub metrics: Arc<Metrics>,
    pub start_time: Instant,
}

#[derive(Serialize)]
struct AcceptedResponse {
    event_id: uuid::Uuid,
    status: &'static str,
    timestamp: chrono::DateTime<Utc>,
}

/// `POST /api/events`. Validates the body, publishes a log record
/// synchronously, and only then responds — the 202 is a durability
/// acknowledgement, not a best-effort ack.
pub async fn post_event(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Response, IngestError> {
    let started = Instant::now();

    let parsed: EventRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            state.metrics.events_rejected.with_label_values(&["body"]).inc();
            return Err(IngestError::Validation(DomainError::Codec(e.to_string())));
        }
    };

    let event = match parsed.validate() {
        Ok(event) => event,
        Err(e) => {
            state.metrics.events_rejected.with_label_values(&[e.field()]).inc();
            return Err(IngestError::Validation(e));
        }
    };

    let record = LogRecord::from_event(&event).map_err(IngestError::Validation)?;

    if let Err(e) = state
        .publisher
        .publish(&state.config.kafka.topic_events, &record)
        .await
    {
        state
            .metrics
            .publish_errors
            .with_label_values(&[&state.config.kafka.topic_events])
            .inc();
        return Err(IngestError::PublishFailed(e.0));
    }

    state
        .metrics
        .events_accepted
        .with_label_values(&[event.event_type.as_str()])
        .inc();
    state
        .metrics
        .request_duration
        .with_label_values(&["post_events"])
        .observe(started.elapsed().as_secs_f64());

    let response = AcceptedResponse {
        event_id: event.event_id,
        status: "accepted",
        timestamp: Utc::now(),
    };
    Ok((StatusCode::ACCEPTED, Json(response)).into_response())
}

/// `GET /api/matches/{matchId}/metrics`.
pub async fn get_match_metrics(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> Result<Response, IngestError> {
    let started = Instant::now();

    if match_id.trim().is_empty() {
        return Err(IngestError::Validation(DomainError::validation(
            "matchId",
            "matchId must not be empty",
        )));
    }

    let metrics = state
        .metrics_repo
        .match_metrics(&match_id)
        .await
        .map_err(|e| {
            state.metrics.query_errors.with_label_values(&["summary"]).inc();
            IngestError::StoreFailed(e.0)
        })?;

    state
        .metrics
        .request_duration
        .with_label_values(&["get_match_metrics"])
        .observe(started.elapsed().as_secs_f64());

    match metrics {
        Some(m) => Ok(Json(m).into_response()),
        None => Err(IngestError::NotFound),
    }
}

pub async fn health() -> Response {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
    }))
    .into_response()
}

pub async fn ready(State(state): State<AppState>) -> Response {
    match state.metrics_repo.ping().await {
        Ok(()) => Json(json!({
            "status": "ready",
            "checks": { "store": "healthy" },
        }))
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not ready",
                "checks": { "store": format!("unhealthy: {}", e.0) },
            })),
        )
            .into_response(),
    }
}

pub async fn metrics_exposition(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
