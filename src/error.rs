//! Harness error types
//!
//! Every failure a run can hit is a variant of [`HarnessError`]. The
//! top-level harness maps each one to a distinct [`FailureKind`] and exit
//! code instead of terminating the process from deep inside a worker.

use thiserror::Error;

use crate::constants::*;
use crate::verifier::OrderViolation;

/// Errors that can occur while producing, consuming or verifying a batch
#[derive(Error, Debug)]
pub enum HarnessError {
    /// A configuration value is missing or out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The Kafka client could not be created or subscribed
    #[error("Transport setup failed: {0}")]
    TransportSetup(String),

    /// The store could not be connected to or pinged
    #[error("Store setup failed: {0}")]
    StoreSetup(String),

    /// A consumed payload could not be decoded into a record
    #[error("Malformed message at partition {partition} offset {offset}: {reason}")]
    MalformedMessage {
        partition: i32,
        offset: i64,
        reason: String,
    },

    /// A record could not be serialized for the wire
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The transport rejected or lost a message
    #[error("Transport error: {0}")]
    Transport(String),

    /// The broker never acknowledged a produced record
    #[error("Delivery failed for record {number}: {reason}")]
    DeliveryFailed { number: i64, reason: String },

    /// Writing a consumed record to the store failed
    #[error("Persistence failed for record {id}: {reason}")]
    Persistence { id: String, reason: String },

    /// Reading the batch back from the store failed
    #[error("Verification read failed: {0}")]
    VerificationRead(String),

    /// The store returned fewer records than the batch size
    #[error("Verification read returned {actual} records, expected {expected}")]
    ShortRead { expected: u64, actual: u64 },

    /// Records sorted by consumption time are not in publish order
    #[error("wrong order: {0}")]
    WrongOrder(OrderViolation),

    /// The completion signal did not fire before the deadline
    #[error("Incomplete batch: {persisted} of {expected} records persisted after {waited_ms}ms")]
    IncompleteBatch {
        expected: u64,
        persisted: u64,
        waited_ms: u64,
    },

    /// Stored rows do not match the batch one-to-one
    #[error("Batch integrity violated: expected {expected} records, found {rows} rows with {distinct} distinct ids")]
    IntegrityViolation {
        expected: u64,
        rows: u64,
        distinct: u64,
    },

    /// A worker task panicked
    #[error("Worker {worker} panicked: {reason}")]
    WorkerPanicked { worker: usize, reason: String },
}

/// Coarse classification of a [`HarnessError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Config,
    TransportSetup,
    StoreSetup,
    MalformedMessage,
    Transport,
    Persistence,
    VerificationRead,
    WrongOrder,
    IncompleteBatch,
    Integrity,
    Internal,
}

impl FailureKind {
    /// Process exit code reported for this kind of failure
    pub fn exit_code(&self) -> i32 {
        match self {
            FailureKind::WrongOrder => EXIT_WRONG_ORDER,
            FailureKind::Config => EXIT_INVALID_CONFIG,
            FailureKind::TransportSetup => EXIT_TRANSPORT_SETUP,
            FailureKind::StoreSetup => EXIT_STORE_SETUP,
            FailureKind::MalformedMessage => EXIT_MALFORMED_MESSAGE,
            FailureKind::Transport => EXIT_TRANSPORT,
            FailureKind::Persistence => EXIT_PERSISTENCE,
            FailureKind::VerificationRead => EXIT_VERIFICATION_READ,
            FailureKind::IncompleteBatch => EXIT_INCOMPLETE_BATCH,
            FailureKind::Integrity => EXIT_INTEGRITY,
            FailureKind::Internal => EXIT_INTERNAL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Config => "config",
            FailureKind::TransportSetup => "transport setup",
            FailureKind::StoreSetup => "store setup",
            FailureKind::MalformedMessage => "malformed message",
            FailureKind::Transport => "transport",
            FailureKind::Persistence => "persistence",
            FailureKind::VerificationRead => "verification read",
            FailureKind::WrongOrder => "wrong order",
            FailureKind::IncompleteBatch => "incomplete batch",
            FailureKind::Integrity => "integrity",
            FailureKind::Internal => "internal",
        }
    }
}

impl HarnessError {
    /// Classify this error into the run's failure taxonomy
    pub fn kind(&self) -> FailureKind {
        match self {
            HarnessError::InvalidConfig(_) => FailureKind::Config,
            HarnessError::TransportSetup(_) => FailureKind::TransportSetup,
            HarnessError::StoreSetup(_) => FailureKind::StoreSetup,
            HarnessError::MalformedMessage { .. } => FailureKind::MalformedMessage,
            HarnessError::Encoding(_)
            | HarnessError::Transport(_)
            | HarnessError::DeliveryFailed { .. } => FailureKind::Transport,
            HarnessError::Persistence { .. } => FailureKind::Persistence,
            HarnessError::VerificationRead(_) | HarnessError::ShortRead { .. } => {
                FailureKind::VerificationRead
            }
            HarnessError::WrongOrder(_) => FailureKind::WrongOrder,
            HarnessError::IncompleteBatch { .. } => FailureKind::IncompleteBatch,
            HarnessError::IntegrityViolation { .. } => FailureKind::Integrity,
            HarnessError::WorkerPanicked { .. } => FailureKind::Internal,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Errors raised by [`crate::store::RecordStore`] implementations
///
/// Store errors carry no run context; callers wrap them into the
/// matching [`HarnessError`] variant.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Decode error: {0}")]
    Decode(String),

    /// Only consumed records may be persisted
    #[error("Record {0} has no consumed_at timestamp")]
    Unconsumed(String),
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Query(err.to_string())
        }
    }
}
