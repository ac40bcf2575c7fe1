use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config as ConfigSource, Environment};

/// Process configuration, assembled from environment variables through
/// a `config`-crate [`Environment`] source — the same builder shape as
/// the ingest service's `Config::from_env`.
#[derive(Debug, Clone)]
pub struct Config {
    pub kafka: KafkaConfig,
    pub clickhouse: ClickHouseConfig,
    pub consumer: ConsumerConfig,
    /// Port the side metrics server binds for `GET /metrics`, mirroring
    /// the teacher's dedicated metrics listener for this process.
    pub metrics_port: u16,
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic_events: String,
    pub topic_retry: String,
    pub topic_dead: String,
    pub publish_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ClickHouseConfig {
    pub url: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub group: String,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_retries: u8,
    /// Upper bound on how long a DRAINING flush may take before the
    /// process gives up waiting and exits anyway.
    pub drain_timeout: Duration,
}

struct Source(ConfigSource);

impl Source {
    fn string(&self, key: &str, default: &str) -> String {
        self.0.get_string(key).unwrap_or_else(|_| default.to_string())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.0
            .get_string(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let built = ConfigSource::builder()
            .add_source(Environment::default().try_parsing(true))
            .build()
            .context("building configuration from environment")?;
        let source = Source(built);

        Ok(Config {
            kafka: KafkaConfig {
                brokers: source.string("kafka_brokers", "localhost:9092"),
                topic_events: source.string("kafka_topic_events", "events"),
                topic_retry: source.string("kafka_topic_retry", "retry"),
                topic_dead: source.string("kafka_topic_dead", "dead"),
                publish_timeout: Duration::from_millis(source.parsed(
                    "kafka_publish_timeout_ms",
                    10_000,
                )),
            },
            clickhouse: ClickHouseConfig {
                url: source.string("clickhouse_url", "http://localhost:8123"),
                database: source.string("clickhouse_database", "analytics"),
                user: source.string("clickhouse_user", "default"),
                password: source.string("clickhouse_password", ""),
            },
            consumer: ConsumerConfig {
                group: source.string("consumer_group", "analytics-consumers"),
                batch_size: source.parsed("consumer_batch_size", 1000),
                flush_interval: Duration::from_secs(source.parsed("consumer_flush_interval", 5)),
                max_retries: source.parsed("consumer_max_retries", 3),
                drain_timeout: Duration::from_secs(30),
            },
            metrics_port: source.parsed("consumer_metrics_port", 9091),
        })
    }
}
