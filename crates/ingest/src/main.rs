//! HTTP ingest service: validates match events, publishes them to the
//! primary log topic, and serves aggregated match metrics.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use matchflow_ingest::config::Config;
use matchflow_ingest::handlers::AppState;
use matchflow_ingest::metrics::Metrics;
use matchflow_ingest::metrics_repo::ClickHouseMetricsRepository;
use matchflow_ingest::publisher::KafkaPublisher;
use matchflow_ingest::router;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matchflow_ingest=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting match-event ingest service");

    let config = Arc::new(Config::from_env().context("loading configuration")?);
    info!(bind_address = %config.server.bind_address, "configuration loaded");

    let publisher = Arc::new(
        KafkaPublisher::new(&config.kafka.brokers, config.kafka.publish_timeout)
            .context("constructing Kafka publisher")?,
    );

    let metrics_repo = Arc::new(ClickHouseMetricsRepository::new(
        &config.clickhouse.url,
        &config.clickhouse.database,
        &config.clickhouse.user,
        &config.clickhouse.password,
    ));

    metrics_repo
        .ping()
        .await
        .context("ClickHouse unreachable at startup")?;
    info!("ClickHouse store reachable");

    let metrics = Arc::new(Metrics::new().context("constructing metrics registry")?);

    let state = AppState {
        config: config.clone(),
        publisher,
        metrics_repo,
        metrics,
        start_time: Instant::now(),
    };

    let app = router::build_router(state, config.server.write_timeout);

    let listener = tokio::net::TcpListener::bind(config.server.bind_address)
        .await
        .with_context(|| format!("binding {}", config.server.bind_address))?;
    info!(address = %config.server.bind_address, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("ingest service shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
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

    tracing::info!("shutdown signal received, draining in-flight requests");
}
