//! Batch consumer: drains the primary topic into size/time-bounded
//! batches, bulk-inserts into the store, and escalates failed batches
//! through the retry/dead-letter topics.

pub mod batch;
pub mod config;
pub mod consumer;
pub mod metrics;
pub mod publisher;
pub mod retry;
pub mod store;
