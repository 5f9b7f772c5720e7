//! Consumption coordinator
//!
//! Runs a fixed pool of workers over one shared [`MessageSource`]. Each
//! worker repeatedly takes a message, decodes it, stamps `consumed_at` and
//! persists it. A shared [`CompletionSignal`] counts successful inserts and
//! fires exactly once when the count reaches the batch size.
//!
//! Fatal worker errors (malformed payload, failed insert) are not handled
//! in the worker: the first one is forwarded to whoever is waiting on the
//! run, which decides how to end it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::constants::DEFAULT_SHUTDOWN_TIMEOUT_MS;
use crate::error::{HarnessError, Result};
use crate::record::{now_micros, Record};
use crate::store::RecordStore;
use crate::transport::{InboundMessage, MessageSource};

// ===== Completion signal =====

/// Counts persisted records and fires once the batch is complete
#[derive(Debug)]
pub struct CompletionSignal {
    expected: u64,
    persisted: AtomicU64,
    fired: AtomicU64,
    sender: Mutex<Option<oneshot::Sender<u64>>>,
}

impl CompletionSignal {
    /// Create a signal for a batch of `expected` records
    pub fn new(expected: u64) -> (Self, oneshot::Receiver<u64>) {
        let (tx, rx) = oneshot::channel();
        let signal = Self {
            expected,
            persisted: AtomicU64::new(0),
            fired: AtomicU64::new(0),
            sender: Mutex::new(Some(tx)),
        };
        (signal, rx)
    }

    /// Count one persisted record
    ///
    /// Returns true for the single call that completes the batch. Calls
    /// past the batch size keep counting but never fire again.
    pub fn record_persisted(&self) -> bool {
        let count = self.persisted.fetch_add(1, Ordering::SeqCst) + 1;
        if count != self.expected {
            return false;
        }

        match self.sender.lock().take() {
            Some(tx) => {
                self.fired.fetch_add(1, Ordering::SeqCst);
                // The receiver may already be gone if the run was abandoned
                let _ = tx.send(count);
                true
            }
            None => false,
        }
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }

    /// Records persisted so far
    pub fn persisted(&self) -> u64 {
        self.persisted.load(Ordering::SeqCst)
    }

    /// How many times the signal fired (0 or 1)
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::SeqCst)
    }
}

// ===== Coordinator =====

/// Configured worker pool, not yet started
pub struct ConsumptionCoordinator {
    expected: u64,
    workers: usize,
    source: Arc<dyn MessageSource>,
    store: Arc<dyn RecordStore>,
}

impl ConsumptionCoordinator {
    pub fn new(
        expected: u64,
        workers: usize,
        source: Arc<dyn MessageSource>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            expected,
            workers: workers.max(1),
            source,
            store,
        }
    }

    /// Spawn the workers
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> RunningCoordinator {
        let (signal, done) = CompletionSignal::new(self.expected);
        let signal = Arc::new(signal);
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();

        let workers = (0..self.workers)
            .map(|id| {
                let source = self.source.clone();
                let store = self.store.clone();
                let signal = signal.clone();
                let faults = fault_tx.clone();
                tokio::spawn(run_worker(id, source, store, signal, faults))
            })
            .collect();

        info!(
            workers = self.workers,
            expected = self.expected,
            "Started consumer workers"
        );

        RunningCoordinator {
            expected: self.expected,
            signal,
            done: Some(done),
            faults: fault_rx,
            workers,
            source: self.source,
        }
    }
}

async fn run_worker(
    id: usize,
    source: Arc<dyn MessageSource>,
    store: Arc<dyn RecordStore>,
    signal: Arc<CompletionSignal>,
    faults: mpsc::UnboundedSender<HarnessError>,
) {
    debug!(worker = id, "Worker started");
    let mut processed: u64 = 0;

    loop {
        let message = match source.recv().await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(e) => {
                error!(worker = id, "Receive failed: {}", e);
                let _ = faults.send(e);
                return;
            }
        };

        if let Err(e) = consume_one(store.as_ref(), message).await {
            error!(worker = id, "{}", e);
            let _ = faults.send(e);
            return;
        }

        processed += 1;

        if signal.record_persisted() {
            info!(
                worker = id,
                expected = signal.expected(),
                "Batch complete"
            );
        }
    }

    debug!(worker = id, processed, "Worker stopped");
}

/// Decode, stamp and persist a single message
async fn consume_one(store: &dyn RecordStore, message: InboundMessage) -> Result<Record> {
    let mut record =
        Record::decode(&message.payload).map_err(|e| HarnessError::MalformedMessage {
            partition: message.partition,
            offset: message.offset,
            reason: e.to_string(),
        })?;

    record.mark_consumed(now_micros());

    store
        .insert_one(&record)
        .await
        .map_err(|e| HarnessError::Persistence {
            id: record.id.clone(),
            reason: e.to_string(),
        })?;

    Ok(record)
}

enum Wake {
    Completed(std::result::Result<u64, oneshot::error::RecvError>),
    Fault(Option<HarnessError>),
    Deadline,
}

/// Handle to a started worker pool
pub struct RunningCoordinator {
    expected: u64,
    signal: Arc<CompletionSignal>,
    done: Option<oneshot::Receiver<u64>>,
    faults: mpsc::UnboundedReceiver<HarnessError>,
    workers: Vec<JoinHandle<()>>,
    source: Arc<dyn MessageSource>,
}

impl RunningCoordinator {
    /// Wait until the batch is complete, a worker fails, or `timeout` elapses
    ///
    /// Returns the persisted count at the moment the signal fired.
    pub async fn wait_for_completion(&mut self, timeout: Duration) -> Result<u64> {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut faults_open = true;

        loop {
            let wake = {
                let done = match self.done.as_mut() {
                    Some(done) => done,
                    None => return Ok(self.signal.persisted()),
                };
                let faults = &mut self.faults;

                tokio::select! {
                    biased;
                    completed = done => Wake::Completed(completed),
                    fault = faults.recv(), if faults_open => Wake::Fault(fault),
                    _ = &mut deadline => Wake::Deadline,
                }
            };

            match wake {
                Wake::Completed(Ok(count)) => {
                    self.done = None;
                    return Ok(count);
                }
                Wake::Completed(Err(_)) | Wake::Deadline => {
                    let persisted = self.signal.persisted();
                    warn!(
                        persisted,
                        expected = self.expected,
                        "Batch incomplete at deadline"
                    );
                    return Err(HarnessError::IncompleteBatch {
                        expected: self.expected,
                        persisted,
                        waited_ms: timeout.as_millis() as u64,
                    });
                }
                Wake::Fault(Some(e)) => return Err(e),
                // Every worker has exited without a fault; keep waiting for the deadline
                Wake::Fault(None) => faults_open = false,
            }
        }
    }

    /// Records persisted so far
    pub fn persisted(&self) -> u64 {
        self.signal.persisted()
    }

    /// How many times the completion signal fired
    pub fn signals_fired(&self) -> u64 {
        self.signal.fired()
    }

    /// Close the source and wait for the workers to exit
    ///
    /// Workers finish the record they are on; inserts still in flight may
    /// land after the completion signal fired. Workers still running after
    /// the shutdown timeout are aborted.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown_with_grace(Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS))
            .await
    }

    /// [`shutdown`](Self::shutdown) with an explicit grace period shared by all workers
    pub async fn shutdown_with_grace(mut self, grace: Duration) -> Result<()> {
        if let Err(e) = self.source.close().await {
            warn!("Closing source failed: {}", e);
        }

        let handles = std::mem::take(&mut self.workers);
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let mut panicked = None;

        match tokio::time::timeout(grace, join_all(handles)).await {
            Ok(results) => {
                for (id, result) in results.into_iter().enumerate() {
                    if let Err(e) = result {
                        if e.is_panic() {
                            error!(worker = id, "Worker panicked: {}", e);
                            panicked.get_or_insert(HarnessError::WorkerPanicked {
                                worker: id,
                                reason: e.to_string(),
                            });
                        }
                    }
                }
            }
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Workers did not stop in time, aborting"
                );
                for abort in aborts {
                    abort.abort();
                }
            }
        }

        while let Ok(e) = self.faults.try_recv() {
            warn!("Fault after completion: {}", e);
        }

        debug!(persisted = self.signal.persisted(), "Coordinator shut down");

        match panicked {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
