//! HTTP ingest service: validates match events, publishes them to the
//! primary log topic, and serves aggregated match metrics.
//!
//! Split into a library and a thin binary so integration tests can
//! drive the router through [`handlers::AppState`] with in-memory
//! fakes instead of a live Kafka/ClickHouse pair.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod metrics_repo;
pub mod publisher;
pub mod router;
