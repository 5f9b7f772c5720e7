//! Top-level runs
//!
//! Wires the components together for one bounded run and classifies how it
//! ended. Nothing below this module exits the process; every failure comes
//! back here as a [`HarnessError`] and becomes a [`RunOutcome`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::constants::EXIT_SUCCESS;
use crate::coordinator::ConsumptionCoordinator;
use crate::error::{FailureKind, HarnessError, Result};
use crate::producer::{BatchGenerator, BatchSummary, ProducerDriver};
use crate::store::{PostgresStore, RecordStore};
use crate::transport::{KafkaPublisher, KafkaSource, MessageSource};
use crate::verifier::{OrderVerifier, OrderViolation, VerificationReport};

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// Every record was persisted once and consumed in publish order
    Success,
    /// The batch was complete but consumed out of publish order
    WrongOrder(OrderViolation),
    /// The completion signal did not fire before the deadline
    IncompleteBatch { expected: u64, persisted: u64 },
    /// Any other failure
    Failed(HarnessError),
}

impl RunOutcome {
    /// Classify the result of a run
    pub fn from_result<T>(result: Result<T>) -> Self {
        match result {
            Ok(_) => RunOutcome::Success,
            Err(HarnessError::WrongOrder(violation)) => RunOutcome::WrongOrder(violation),
            Err(HarnessError::IncompleteBatch {
                expected,
                persisted,
                ..
            }) => RunOutcome::IncompleteBatch {
                expected,
                persisted,
            },
            Err(e) => RunOutcome::Failed(e),
        }
    }

    pub fn label(&self) -> String {
        match self {
            RunOutcome::Success => "success".to_string(),
            RunOutcome::WrongOrder(_) => "wrong order".to_string(),
            RunOutcome::IncompleteBatch { .. } => "incomplete batch".to_string(),
            RunOutcome::Failed(e) => e.to_string(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Success => EXIT_SUCCESS,
            RunOutcome::WrongOrder(_) => FailureKind::WrongOrder.exit_code(),
            RunOutcome::IncompleteBatch { .. } => FailureKind::IncompleteBatch.exit_code(),
            RunOutcome::Failed(e) => e.exit_code(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success)
    }
}

/// Batch parameters of a consumer run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub expected: u64,
    pub workers: usize,
    pub completion_timeout: Duration,
}

impl From<&HarnessConfig> for PipelineSettings {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            expected: config.batch_size,
            workers: config.workers,
            completion_timeout: config.completion_timeout,
        }
    }
}

/// Details of a run that got through verification
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Persisted count when the completion signal fired
    pub persisted: u64,
    pub verification: VerificationReport,
}

/// Reset the store, consume the batch, then verify it
///
/// Workers are always shut down (and the source closed) before the store
/// is read back, whether or not the batch completed.
pub async fn run_pipeline(
    source: Arc<dyn MessageSource>,
    store: Arc<dyn RecordStore>,
    settings: PipelineSettings,
) -> Result<RunReport> {
    store
        .reset()
        .await
        .map_err(|e| HarnessError::StoreSetup(format!("Failed to reset store: {}", e)))?;

    let mut running = ConsumptionCoordinator::new(
        settings.expected,
        settings.workers,
        source,
        store.clone(),
    )
    .start();

    let waited = running
        .wait_for_completion(settings.completion_timeout)
        .await;
    let shutdown = running.shutdown().await;

    let persisted = waited?;
    shutdown?;

    let verifier = OrderVerifier::new(store, settings.expected);
    let verification = verifier.verify().await?;
    verifier.check_integrity().await?;

    Ok(RunReport {
        persisted,
        verification,
    })
}

/// Consume one batch from Kafka into PostgreSQL and verify it
pub async fn run_consumer(config: &HarnessConfig) -> RunOutcome {
    let result: Result<RunReport> = async {
        let store = PostgresStore::connect(&config.store).await?;
        let source = KafkaSource::new(&config.kafka)?;
        run_pipeline(Arc::new(source), Arc::new(store), config.into()).await
    }
    .await;

    if let Ok(report) = &result {
        info!(
            persisted = report.persisted,
            checked = report.verification.checked,
            "Consumer run verified"
        );
    }

    let outcome = RunOutcome::from_result(result);
    if let RunOutcome::WrongOrder(violation) = &outcome {
        warn!("{}", violation);
    }
    outcome
}

/// Publish one batch to Kafka
pub async fn run_producer(config: &HarnessConfig) -> RunOutcome {
    let result: Result<BatchSummary> = async {
        let publisher = KafkaPublisher::new(&config.kafka)?;
        ProducerDriver::new(Arc::new(publisher))
            .publish(BatchGenerator::new(config.batch_size))
            .await
    }
    .await;

    if let Ok(summary) = &result {
        info!(
            records = summary.len(),
            topic = %config.kafka.topic,
            "Producer run delivered"
        );
    }

    RunOutcome::from_result(result)
}
