use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

/// Process-wide counters and histograms, exposed on `GET /metrics`.
/// Mirrors the shape of the teacher's `MetricsCollector`, narrowed to
/// the counters this domain actually needs and backed by the
/// `prometheus` crate's lock-free atomics rather than hand-rolled ones.
pub struct Metrics {
    registry: Registry,
    pub events_accepted: IntCounterVec,
    pub events_rejected: IntCounterVec,
    pub publish_errors: IntCounterVec,
    pub query_errors: IntCounterVec,
    pub request_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let events_accepted = IntCounterVec::new(
            Opts::new(
                "ingest_events_accepted_total",
                "Events durably published to the primary topic, by event type",
            ),
            &["event_type"],
        )?;

        let events_rejected = IntCounterVec::new(
            Opts::new(
                "ingest_events_rejected_total",
                "Events rejected during validation, by offending field",
            ),
            &["field"],
        )?;

        let publish_errors = IntCounterVec::new(
            Opts::new(
                "ingest_publish_errors_total",
                "Publish attempts to the log that failed",
            ),
            &["topic"],
        )?;

        let query_errors = IntCounterVec::new(
            Opts::new("ingest_query_errors_total", "Store query failures, by query kind"),
            &["query"],
        )?;

        let request_duration = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "ingest_http_request_duration_seconds",
                "HTTP handler latency, by route",
            ),
            &["route"],
        )?;

        registry.register(Box::new(events_accepted.clone()))?;
        registry.register(Box::new(events_rejected.clone()))?;
        registry.register(Box::new(publish_errors.clone()))?;
        registry.register(Box::new(query_errors.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Metrics {
            registry,
            events_accepted,
            events_rejected,
            publish_errors,
            query_errors,
            request_duration,
        })
    }

    /// Renders the registry in Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
