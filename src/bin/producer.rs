//! order-producer
//!
//! Publishes one ordered batch to Kafka.
//!
//! ## Usage
//!
//! ```bash
//! KAFKA_DSN=localhost:9092 BATCH_SIZE=1000 order-producer
//! ```
//!
//! Exits 0 once every record has been acknowledged by the broker.

use std::process;

use kafka_order_check::{logging, run_producer, HarnessConfig, RunOutcome};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    logging::init();

    let config = match HarnessConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            process::exit(e.exit_code());
        }
    };

    info!(
        topic = %config.kafka.topic,
        partition = ?config.kafka.partition,
        batch_size = config.batch_size,
        "Producing batch"
    );

    let outcome = run_producer(&config).await;
    match &outcome {
        RunOutcome::Success => info!("success"),
        RunOutcome::Failed(e) => error!(kind = e.kind().as_str(), "{}", e),
        _ => error!("{}", outcome.label()),
    }
    process::exit(outcome.exit_code());
}
