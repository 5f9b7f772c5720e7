//! Default values and limits for harness configuration
//!
//! Names mirror the environment variables read by [`crate::config`].

// ===== Kafka =====

/// Default bootstrap servers
pub const DEFAULT_KAFKA_DSN: &str = "localhost:9092";

/// Default security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL)
pub const DEFAULT_SECURITY_PROTOCOL: &str = "PLAINTEXT";

/// Default topic the batch is produced to and consumed from
pub const DEFAULT_TOPIC: &str = "poc-test-part-1";

/// Default partition the producer pins every record to
pub const DEFAULT_PARTITION: i32 = 1;

/// Default Kafka client id
pub const DEFAULT_CLIENT_ID: &str = "order-check";

/// Default offset reset policy for a fresh consumer group
pub const DEFAULT_AUTO_OFFSET_RESET: &str = "earliest";

/// Default max.poll.interval.ms for the consumer
pub const DEFAULT_MAX_POLL_INTERVAL_MS: u64 = 10_000;

/// Default session.timeout.ms for the consumer (must not exceed the poll interval)
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 6_000;

/// Default per-message delivery timeout for the producer
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 30_000;

/// Security protocols accepted by librdkafka
pub const SECURITY_PROTOCOLS: [&str; 4] = ["PLAINTEXT", "SSL", "SASL_PLAINTEXT", "SASL_SSL"];

// ===== Batch =====

/// Default number of records per run
pub const DEFAULT_BATCH_SIZE: u64 = 1000;

/// Default number of consumer workers
pub const DEFAULT_WORKERS: usize = 10;

/// Default deadline for the completion signal
pub const DEFAULT_COMPLETION_TIMEOUT_MS: u64 = 300_000;

/// How long shutdown waits for a worker to finish its in-flight record
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

// ===== Store =====

/// Default PostgreSQL connection string
pub const DEFAULT_DATABASE_URL: &str = "host=localhost port=5432 user=postgres dbname=test";

/// Default table records are persisted into
pub const DEFAULT_TABLE: &str = "messages";

/// Maximum length of a PostgreSQL identifier
pub const MAX_IDENTIFIER_LEN: usize = 63;

// ===== Exit codes =====

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_WRONG_ORDER: i32 = 1;
pub const EXIT_INVALID_CONFIG: i32 = 2;
pub const EXIT_TRANSPORT_SETUP: i32 = 3;
pub const EXIT_STORE_SETUP: i32 = 4;
pub const EXIT_MALFORMED_MESSAGE: i32 = 5;
pub const EXIT_TRANSPORT: i32 = 6;
pub const EXIT_PERSISTENCE: i32 = 7;
pub const EXIT_VERIFICATION_READ: i32 = 8;
pub const EXIT_INCOMPLETE_BATCH: i32 = 9;
pub const EXIT_INTEGRITY: i32 = 10;
pub const EXIT_INTERNAL: i32 = 11;
