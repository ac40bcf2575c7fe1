use anyhow::Result;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Process-wide counters and histograms for the consume/flush loop,
/// exposed on `GET /metrics` by an optional side HTTP server in
/// deployments that scrape it.
pub struct Metrics {
    registry: Registry,
    pub processed: IntCounter,
    pub parsed: IntCounter,
    pub parse_error: IntCounter,
    pub insert_error: IntCounterVec,
    pub retried: IntCounter,
    pub dead_lettered: IntCounter,
    pub dead_letter_drop: IntCounter,
    pub batch_size: Histogram,
    pub flush_duration: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let processed = IntCounter::new(
            "consumer_records_processed_total",
            "Records read from the primary topic",
        )?;
        let parsed = IntCounter::new(
            "consumer_events_parsed_total",
            "Records successfully decoded into an Event",
        )?;
        let parse_error = IntCounter::new(
            "consumer_parse_errors_total",
            "Records that failed to decode and were quarantined",
        )?;
        let insert_error = IntCounterVec::new(
            Opts::new("consumer_insert_errors_total", "Bulk insert attempts that failed"),
            &["stage"],
        )?;
        let retried = IntCounter::new(
            "consumer_events_retried_total",
            "Events republished to the retry topic",
        )?;
        let dead_lettered = IntCounter::new(
            "consumer_events_dead_lettered_total",
            "Events published to the dead-letter topic",
        )?;
        let dead_letter_drop = IntCounter::new(
            "consumer_dead_letter_publish_failures_total",
            "Events lost because the dead-letter publish itself failed",
        )?;
        let batch_size = Histogram::with_opts(HistogramOpts::new(
            "consumer_batch_size",
            "Number of events per flushed batch",
        ))?;
        let flush_duration = Histogram::with_opts(HistogramOpts::new(
            "consumer_flush_duration_seconds",
            "Time spent on the bulk insert portion of a flush",
        ))?;

        registry.register(Box::new(processed.clone()))?;
        registry.register(Box::new(parsed.clone()))?;
        registry.register(Box::new(parse_error.clone()))?;
        registry.register(Box::new(insert_error.clone()))?;
        registry.register(Box::new(retried.clone()))?;
        registry.register(Box::new(dead_lettered.clone()))?;
        registry.register(Box::new(dead_letter_drop.clone()))?;
        registry.register(Box::new(batch_size.clone()))?;
        registry.register(Box::new(flush_duration.clone()))?;

        Ok(Metrics {
            registry,
            processed,
            parsed,
            parse_error,
            insert_error,
            retried,
            dead_lettered,
            dead_letter_drop,
            batch_size,
            flush_duration,
        })
    }

    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
