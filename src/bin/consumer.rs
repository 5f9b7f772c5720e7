//! order-consumer
//!
//! Consumes one batch from Kafka into PostgreSQL and checks that it was
//! consumed in publish order.
//!
//! ## Usage
//!
//! ```bash
//! KAFKA_DSN=localhost:9092 DATABASE_URL="host=localhost user=postgres" \
//!     WORKERS=10 BATCH_SIZE=1000 order-consumer
//! ```
//!
//! ## Exit Codes
//!
//! - 0: batch consumed in publish order
//! - 1: wrong order
//! - 9: batch incomplete at the completion deadline
//! - other: see `kafka_order_check::constants`

use std::process;

use kafka_order_check::{logging, run_consumer, HarnessConfig, RunOutcome};
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
        group_id = %config.kafka.group_id,
        workers = config.workers,
        batch_size = config.batch_size,
        "Consuming batch"
    );

    let outcome = run_consumer(&config).await;
    match &outcome {
        RunOutcome::Success => info!("success"),
        RunOutcome::IncompleteBatch {
            expected,
            persisted,
        } => error!(expected, persisted, "{}", outcome.label()),
        RunOutcome::Failed(e) => error!(kind = e.kind().as_str(), "{}", e),
        RunOutcome::WrongOrder(_) => error!("{}", outcome.label()),
    }
    process::exit(outcome.exit_code());
}
