//! Domain model, validation and wire codec for match events.
//!
//! This crate has no I/O: it owns the `Event`/`EventRequest` types, the
//! validation pipeline that turns a raw request into a trusted `Event`,
//! the JSON codec used both on the HTTP boundary and for the log's
//! record value, and the shared error taxonomy the other crates map to
//! HTTP status codes or log-and-continue behavior.

mod codec;
mod error;
mod event;
mod metrics_model;

pub use codec::{DeadLetterEnvelope, LogRecord, RETRY_COUNT_HEADER};
pub use error::DomainError;
pub use event::{Event, EventRequest, EventType};
pub use metrics_model::{MatchMetrics, PeakMinute};
