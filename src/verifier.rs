//! Order verification
//!
//! After the batch is persisted, the records are read back sorted by
//! `consumed_at` and checked against the order the producer assigned.
//! The check itself is a pure function ([`check_order`]) so it can be
//! exercised without a store.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{HarnessError, Result};
use crate::record::Record;
use crate::store::RecordStore;

/// The fields of a record that matter when reporting an ordering failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSummary {
    pub id: String,
    pub number: i64,
    pub published_at: i64,
    pub consumed_at: Option<i64>,
}

impl From<&Record> for RecordSummary {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            number: record.number,
            published_at: record.published_at,
            consumed_at: record.consumed_at,
        }
    }
}

impl fmt::Display for RecordSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} (id {}, published_at {}, consumed_at ",
            self.number, self.id, self.published_at
        )?;
        match self.consumed_at {
            Some(ts) => write!(f, "{})", ts),
            None => write!(f, "none)"),
        }
    }
}

/// First adjacent pair found out of publish order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderViolation {
    /// Position of `later` in the consumption-ordered sequence
    pub index: usize,
    /// Record consumed first
    pub earlier: RecordSummary,
    /// Record consumed next, but published before `earlier`
    pub later: RecordSummary,
    /// Number of adjacent inversions across the whole sequence
    pub total_inversions: usize,
}

impl fmt::Display for OrderViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record at index {} {} was published before its predecessor {} ({} adjacent inversion{})",
            self.index,
            self.later,
            self.earlier,
            self.total_inversions,
            if self.total_inversions == 1 { "" } else { "s" }
        )
    }
}

/// Check that `records`, already sorted by `consumed_at`, are in publish order
///
/// Equal `published_at` values on adjacent records are accepted. Sequences
/// of zero or one record are trivially ordered.
pub fn check_order(records: &[Record]) -> std::result::Result<(), OrderViolation> {
    let mut first: Option<usize> = None;
    let mut total_inversions = 0;

    for (i, pair) in records.windows(2).enumerate() {
        if pair[0].published_at > pair[1].published_at {
            total_inversions += 1;
            first.get_or_insert(i + 1);
        }
    }

    match first {
        None => Ok(()),
        Some(index) => Err(OrderViolation {
            index,
            earlier: RecordSummary::from(&records[index - 1]),
            later: RecordSummary::from(&records[index]),
            total_inversions,
        }),
    }
}

/// Result of a successful verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    /// Records read back and checked
    pub checked: usize,
    /// Consumption window covered by the batch, in microseconds
    pub consumed_span_us: i64,
}

/// Reads a persisted batch back and checks it
pub struct OrderVerifier {
    store: Arc<dyn RecordStore>,
    expected: u64,
}

impl OrderVerifier {
    pub fn new(store: Arc<dyn RecordStore>, expected: u64) -> Self {
        Self { store, expected }
    }

    /// Read the first `expected` records by `consumed_at` and check their order
    pub async fn verify(&self) -> Result<VerificationReport> {
        let records = self
            .store
            .find_sorted_by_consumed_at(self.expected as usize)
            .await
            .map_err(|e| HarnessError::VerificationRead(e.to_string()))?;

        debug!("Read {} records back for verification", records.len());

        if (records.len() as u64) < self.expected {
            return Err(HarnessError::ShortRead {
                expected: self.expected,
                actual: records.len() as u64,
            });
        }

        if let Err(violation) = check_order(&records) {
            warn!(
                index = violation.index,
                inversions = violation.total_inversions,
                "Batch consumed out of order"
            );
            return Err(HarnessError::WrongOrder(violation));
        }

        let consumed_span_us = match (records.first(), records.last()) {
            (Some(first), Some(last)) => {
                last.consumed_at.unwrap_or(0) - first.consumed_at.unwrap_or(0)
            }
            _ => 0,
        };

        info!(
            checked = records.len(),
            consumed_span_us, "Batch consumed in publish order"
        );

        Ok(VerificationReport {
            checked: records.len(),
            consumed_span_us,
        })
    }

    /// Check that the store holds exactly one row per record of the batch
    pub async fn check_integrity(&self) -> Result<()> {
        let rows = self
            .store
            .count()
            .await
            .map_err(|e| HarnessError::VerificationRead(e.to_string()))?;
        let distinct = self
            .store
            .count_distinct_ids()
            .await
            .map_err(|e| HarnessError::VerificationRead(e.to_string()))?;

        if rows != self.expected || distinct != self.expected {
            return Err(HarnessError::IntegrityViolation {
                expected: self.expected,
                rows,
                distinct,
            });
        }
        Ok(())
    }
}
