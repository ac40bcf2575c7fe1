use std::time::Duration;

use futures::StreamExt;
use matchflow_domain::LogRecord;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset as KafkaOffset, TopicPartitionList};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::batch::{EventBatch, Offset};
use crate::config::Config;
use crate::metrics::Metrics;
use crate::publisher::LogPublisher;
use crate::retry;
use crate::store::EventStore;

/// Per-fetch timeout that keeps the RUNNING state responsive to the
/// flush timer and to shutdown even when the primary topic is idle.
const FETCH_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn create_consumer(brokers: &str, group: &str, topic: &str) -> Result<StreamConsumer, rdkafka::error::KafkaError> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", group)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .create()?;

    consumer.subscribe(&[topic])?;
    Ok(consumer)
}

/// Drives the RUNNING → FLUSHING → DRAINING state machine for one
/// consumer instance. Runs until `shutdown` is cancelled, at which
/// point any buffered batch is flushed one last time with a bounded
/// timeout before returning.
pub async fn run(
    config: &Config,
    consumer: &StreamConsumer,
    store: &dyn EventStore,
    publisher: &dyn LogPublisher,
    metrics: &Metrics,
    shutdown: CancellationToken,
) {
    let mut batch = EventBatch::new();
    let mut message_stream = consumer.stream();

    info!(group = %config.consumer.group, "consumer entering RUNNING state");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown signalled, entering DRAINING state");
                break;
            }
            fetched = tokio::time::timeout(FETCH_POLL_INTERVAL, message_stream.next()) => {
                match fetched {
                    Ok(Some(Ok(msg))) => {
                        metrics.processed.inc();
                        if !handle_record(&msg, &mut batch, metrics) {
                            // Quarantined: commit past it immediately so a
                            // poison record never blocks progress, even if
                            // the next flush is still far away.
                            if let Err(e) = consumer.commit_message(&msg, CommitMode::Async) {
                                warn!(error = %e, "failed to commit past a quarantined record");
                            }
                        }
                    }
                    Ok(Some(Err(e))) => {
                        error!(error = %e, "kafka fetch error");
                    }
                    Ok(None) => {
                        warn!("message stream ended");
                        break;
                    }
                    Err(_) => {
                        // Per-fetch timeout elapsed with nothing to read;
                        // fall through to the periodic flush check below.
                    }
                }
            }
        }

        if batch.should_flush(config.consumer.batch_size, config.consumer.flush_interval) {
            flush(config, consumer, store, publisher, metrics, &mut batch).await;
        }
    }

    if !batch.is_empty() {
        info!(pending = batch.len(), "draining buffered batch before shutdown");
        let drain = tokio::time::timeout(
            config.consumer.drain_timeout,
            flush(config, consumer, store, publisher, metrics, &mut batch),
        );
        if drain.await.is_err() {
            error!(
                timeout_secs = config.consumer.drain_timeout.as_secs(),
                "drain flush exceeded its bound, exiting anyway"
            );
        }
    }

    info!("consumer closed");
}

/// Decodes one fetched message. A decode failure quarantines the
/// record: it is counted and its offset tracked for commit, but it
/// never enters the batch — the spec's poison-pill property requires
/// progress past malformed records within one poll cycle.
/// Returns `true` if the record was added to the batch, `false` if it
/// was quarantined as unparsable.
fn handle_record(msg: &rdkafka::message::BorrowedMessage<'_>, batch: &mut EventBatch, metrics: &Metrics) -> bool {
    let record = log_record_from_message(msg);
    let offset = Offset {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
    };

    match record.decode_event() {
        Ok(event) => {
            metrics.parsed.inc();
            batch.add(event, record, offset);
            true
        }
        Err(e) => {
            metrics.parse_error.inc();
            warn!(topic = %offset.topic, partition = offset.partition, offset = offset.offset, error = %e, "quarantined unparsable record");
            false
        }
    }
}

fn log_record_from_message(msg: &rdkafka::message::BorrowedMessage<'_>) -> LogRecord {
    let key = msg.key().unwrap_or(&[]).to_vec();
    let value = msg.payload().unwrap_or(&[]).to_vec();
    let headers = msg
        .headers()
        .map(|headers| {
            (0..headers.count())
                .map(|i| {
                    let header = headers.get(i);
                    (header.key.to_string(), header.value.unwrap_or(&[]).to_vec())
                })
                .collect()
        })
        .unwrap_or_default();

    LogRecord { key, value, headers }
}

/// One flush: snapshot the buffer, bulk-insert, then either commit
/// (on success) or escalate through retry/dead and commit anyway — the
/// primary offsets always advance once a batch has been through this
/// path, since nothing more can be done with it on the primary topic.
async fn flush(
    config: &Config,
    consumer: &StreamConsumer,
    store: &dyn EventStore,
    publisher: &dyn LogPublisher,
    metrics: &Metrics,
    batch: &mut EventBatch,
) {
    let (events, records, offsets) = batch.take();
    if events.is_empty() {
        return;
    }

    metrics.batch_size.observe(events.len() as f64);
    let started = std::time::Instant::now();
    let result = store.insert_batch(&events).await;
    metrics.flush_duration.observe(started.elapsed().as_secs_f64());

    match result {
        Ok(()) => {
            info!(batch_size = events.len(), "flushed batch to store");
        }
        Err(e) => {
            error!(batch_size = events.len(), error = %e, "bulk insert failed, escalating batch");
            metrics.insert_error.with_label_values(&["bulk_insert"]).inc();
            retry::escalate(
                &events,
                &records,
                &e.0,
                &config.kafka.topic_retry,
                &config.kafka.topic_dead,
                config.consumer.max_retries,
                publisher,
                metrics,
            )
            .await;
        }
    }

    commit_offsets(consumer, &offsets);
}

/// Commits the highest offset seen per partition in this flush. A
/// commit failure is logged but not treated as a flush failure — the
/// events are already durable (in the store or on retry/dead); at
/// worst, duplicates are reprocessed on restart.
fn commit_offsets(consumer: &StreamConsumer, offsets: &[Offset]) {
    if offsets.is_empty() {
        return;
    }

    let mut tpl = TopicPartitionList::new();
    for offset in offsets {
        tpl.add_partition_offset(&offset.topic, offset.partition, KafkaOffset::Offset(offset.offset + 1))
            .ok();
    }

    if let Err(e) = consumer.commit(&tpl, CommitMode::Async) {
        warn!(error = %e, "offset commit failed, duplicates may be reprocessed on restart");
    }
}
