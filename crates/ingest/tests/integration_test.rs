use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use matchflow_ingest::config::{ClickHouseConfig, Config, KafkaConfig, ServerConfig};
use matchflow_ingest::handlers::AppState;
use matchflow_ingest::metrics::Metrics;
use matchflow_ingest::metrics_repo::fakes::FakeMetricsRepository;
use matchflow_ingest::publisher::fakes::FakePublisher;
use matchflow_ingest::router::build_router;

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(30),
        },
        kafka: KafkaConfig {
            brokers: "unused:9092".to_string(),
            topic_events: "events".to_string(),
            topic_retry: "retry".to_string(),
            topic_dead: "dead".to_string(),
            publish_timeout: Duration::from_millis(500),
        },
        clickhouse: ClickHouseConfig {
            url: "http://unused:8123".to_string(),
            database: "analytics".to_string(),
            user: "default".to_string(),
            password: "".to_string(),
        },
    }
}

struct Harness {
    app: axum::Router,
    publisher: Arc<FakePublisher>,
    metrics_repo: Arc<FakeMetricsRepository>,
}

fn harness() -> Harness {
    let publisher = Arc::new(FakePublisher::default());
    let metrics_repo = Arc::new(FakeMetricsRepository::default());
    let state = AppState {
        config: Arc::new(test_config()),
        publisher: publisher.clone(),
        metrics_repo: metrics_repo.clone(),
        metrics: Arc::new(Metrics::new().unwrap()),
        start_time: Instant::now(),
    };
    let app = build_router(state, Duration::from_secs(5));
    Harness { app, publisher, metrics_repo }
}

fn valid_event_body() -> Value {
    json!({
        "eventId": Uuid::new_v4().to_string(),
        "matchId": "M-100",
        "eventType": "goal",
        "timestamp": "2024-05-01T12:00:00Z",
        "teamId": 1,
        "playerId": "p9",
    })
}

async fn post_json(app: axum::Router, path: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn get_json(app: axum::Router, path: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn accepts_a_valid_event_and_publishes_it() {
    let h = harness();
    let (status, body) = post_json(h.app, "/api/events", valid_event_body()).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    assert!(body["eventId"].is_string());

    let published = h.publisher.topics.lock().unwrap();
    assert_eq!(published.get("events").map(|v| v.len()), Some(1));
}

#[tokio::test]
async fn rejects_malformed_json_with_body_field() {
    let h = harness();
    let response = h
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/events")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["field"], "body");
}

#[tokio::test]
async fn rejects_invalid_team_id_with_team_id_field() {
    let h = harness();
    let mut event = valid_event_body();
    event["teamId"] = json!(7);
    let (status, body) = post_json(h.app, "/api/events", event).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "teamId");
}

#[tokio::test]
async fn rejects_unknown_event_type() {
    let h = harness();
    let mut event = valid_event_body();
    event["eventType"] = json!("GOAL");
    let (status, body) = post_json(h.app, "/api/events", event).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "eventType");
}

#[tokio::test]
async fn publish_failure_surfaces_as_503() {
    let h = harness();
    *h.publisher.fail_next.lock().unwrap() = true;
    let (status, body) = post_json(h.app, "/api/events", valid_event_body()).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "publish_failed");
}

#[tokio::test]
async fn metrics_for_unknown_match_is_404() {
    let h = harness();
    let (status, _) = get_json(h.app, "/api/matches/does-not-exist/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_for_known_match_returns_summary() {
    use matchflow_domain::MatchMetrics;
    use std::collections::HashMap;

    let h = harness();
    h.metrics_repo.matches.lock().unwrap().insert(
        "M-200".to_string(),
        MatchMetrics {
            match_id: "M-200".to_string(),
            total_events: 3,
            events_by_type: HashMap::new(),
            goals: 1,
            yellow_cards: 0,
            red_cards: 0,
            first_event_at: None,
            last_event_at: None,
            peak_minute: None,
        },
    );

    let (status, body) = get_json(h.app, "/api/matches/M-200/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalEvents"], 3);
    assert_eq!(body["goals"], 1);
}

#[tokio::test]
async fn store_failure_on_metrics_read_is_500() {
    let h = harness();
    *h.metrics_repo.fail_next.lock().unwrap() = true;
    let (status, _) = get_json(h.app, "/api/matches/M-300/metrics").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn health_is_always_ok() {
    let h = harness();
    let (status, _) = get_json(h.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn ready_reflects_store_health() {
    let h = harness();
    let (status, _) = get_json(h.app, "/ready").await;
    assert_eq!(status, StatusCode::OK);
}
