//! kafka_order_check
//!
//! Verifies that a message pipeline preserves publish order. A producer
//! publishes a numbered batch with strictly increasing publish timestamps;
//! a pool of consumer workers stamps each message with its consumption
//! time and persists it; once the whole batch is stored, the records are
//! read back by consumption time and checked against publish order.
//!
//! # Organization
//! - `record` - record model and publish clock
//! - `transport` - Kafka and in-process message transports
//! - `store` - PostgreSQL and in-memory record stores
//! - `producer` - batch generation and publishing
//! - `coordinator` - consumer worker pool and completion signal
//! - `verifier` - order and integrity checks
//! - `harness` - end-to-end runs and their outcomes

pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod harness;
pub mod logging;
pub mod producer;
pub mod record;
pub mod store;
pub mod transport;
pub mod verifier;

pub use config::HarnessConfig;
pub use error::{FailureKind, HarnessError, Result, StoreError};
pub use harness::{run_consumer, run_pipeline, run_producer, PipelineSettings, RunOutcome};
pub use record::{Payload, PublishClock, Record};
