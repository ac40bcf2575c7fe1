//! Batch consumer binary: drains the primary topic, bulk-inserts into
//! the store, and escalates failed batches through retry/dead.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Router};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use matchflow_consumer::config::Config;
use matchflow_consumer::consumer;
use matchflow_consumer::metrics::Metrics;
use matchflow_consumer::publisher::KafkaLogPublisher;
use matchflow_consumer::store::{ClickHouseEventStore, EventStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matchflow_consumer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting match-event batch consumer");

    let config = Config::from_env().context("loading configuration")?;
    info!(
        group = %config.consumer.group,
        batch_size = config.consumer.batch_size,
        "configuration loaded"
    );

    let kafka_consumer = consumer::create_consumer(
        &config.kafka.brokers,
        &config.consumer.group,
        &config.kafka.topic_events,
    )
    .context("constructing Kafka consumer")?;

    let publisher = KafkaLogPublisher::new(&config.kafka.brokers, config.kafka.publish_timeout)
        .context("constructing Kafka publisher for retry/dead topics")?;

    let store = ClickHouseEventStore::new(
        &config.clickhouse.url,
        &config.clickhouse.database,
        &config.clickhouse.user,
        &config.clickhouse.password,
    );
    store.ping().await.context("ClickHouse unreachable at startup")?;
    info!("ClickHouse store reachable");

    let metrics = Arc::new(Metrics::new().context("constructing metrics registry")?);

    spawn_metrics_server(config.metrics_port, metrics.clone());

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        shutdown_signal.cancel();
    });

    consumer::run(&config, &kafka_consumer, &store, &publisher, &metrics, shutdown).await;

    info!("batch consumer shut down cleanly");
    Ok(())
}

/// Side HTTP server exposing `GET /metrics` for Prometheus scraping,
/// separate from the consumer's fetch/flush loop — grounded on the
/// teacher's dedicated metrics listener in `siem_consumer/src/main.rs`.
/// Binding failures are logged rather than fatal: a consumer that can't
/// open this port still drains and flushes events correctly.
fn spawn_metrics_server(port: u16, metrics: Arc<Metrics>) {
    tokio::spawn(async move {
        let app = Router::new()
            .route("/metrics", get(metrics_exposition))
            .with_state(metrics);

        let addr = format!("0.0.0.0:{port}");
        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, addr = %addr, "failed to bind metrics server, continuing without it");
                return;
            }
        };

        info!(addr = %addr, "metrics server listening on /metrics");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "metrics server exited");
        }
    });
}

async fn metrics_exposition(State(metrics): State<Arc<Metrics>>) -> Response {
    match metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
