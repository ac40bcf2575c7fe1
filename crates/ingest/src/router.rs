use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{self, AppState};

/// Builds the service router. Middleware chrome (tracing, compression,
/// CORS, per-request timeout) is wired the way `receiver.rs`'s
/// `create_router` does it on the teacher; the request-id/auth layers
/// the teacher also carries are out of this spec's scope and dropped.
pub fn build_router(state: AppState, write_timeout: Duration) -> Router {
    Router::new()
        .route("/api/events", post(handlers::post_event))
        .route("/api/matches/:match_id/metrics", get(handlers::get_match_metrics))
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/metrics", get(handlers::metrics_exposition))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(write_timeout))
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}
