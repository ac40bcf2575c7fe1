use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config as ConfigSource, Environment};

/// Process configuration, assembled from environment variables through
/// a `config`-crate [`Environment`] source, the same builder shape the
/// teacher's `Config::load_with_overrides` uses — minus the file layer,
/// since this crate's env-var surface has no accompanying TOML/YAML
/// config file to layer underneath it.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub kafka: KafkaConfig,
    pub clickhouse: ClickHouseConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
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

/// Thin wrapper around a built [`config::Config`] that applies a
/// per-key default before falling through to the env-sourced value,
/// mirroring the `#[serde(default = "...")]` fallback pattern the
/// teacher's config structs use for their own optional fields.
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

        let host = source.string("server_host", "0.0.0.0");
        let port: u16 = source.parsed("server_port", 8080);
        let bind_address = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("invalid SERVER_HOST/SERVER_PORT: {host}:{port}"))?;

        Ok(Config {
            server: ServerConfig {
                bind_address,
                read_timeout: Duration::from_secs(source.parsed("server_read_timeout_secs", 10)),
                write_timeout: Duration::from_secs(source.parsed("server_write_timeout_secs", 10)),
                idle_timeout: Duration::from_secs(source.parsed("server_idle_timeout_secs", 60)),
            },
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
        })
    }
}
