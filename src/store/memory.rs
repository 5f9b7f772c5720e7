//! In-memory record store
//!
//! Used by the in-process pipeline tests. Optional insert latency lets
//! tests widen the window between consuming a record and persisting it,
//! and an injected failure exercises the persistence error path.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;

use super::{RecordStore, StoreResult};
use crate::error::StoreError;
use crate::record::Record;

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<Record>>,
    inserts: AtomicU64,
    latency_us: Option<RangeInclusive<u64>>,
    fail_on_insert: Option<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with records already stored, as if left over from a previous run
    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    /// Sleep a random duration in `range` (microseconds) before each insert
    pub fn with_insert_latency(mut self, range: RangeInclusive<u64>) -> Self {
        self.latency_us = Some(range);
        self
    }

    /// Fail the `nth` insert (1-based) with a query error
    pub fn fail_on_insert(mut self, nth: u64) -> Self {
        self.fail_on_insert = Some(nth);
        self
    }

    /// Copy of every stored record in insertion order
    pub fn snapshot(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn reset(&self) -> StoreResult<()> {
        self.records.lock().clear();
        self.inserts.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn insert_one(&self, record: &Record) -> StoreResult<()> {
        if !record.is_consumed() {
            return Err(StoreError::Unconsumed(record.id.clone()));
        }

        let delay = self
            .latency_us
            .as_ref()
            .map(|range| Duration::from_micros(rand::thread_rng().gen_range(range.clone())));
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let attempt = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_insert == Some(attempt) {
            return Err(StoreError::Query(format!(
                "injected failure on insert {}",
                attempt
            )));
        }

        self.records.lock().push(record.clone());
        Ok(())
    }

    async fn find_sorted_by_consumed_at(&self, limit: usize) -> StoreResult<Vec<Record>> {
        let mut records = self.snapshot();
        // Stable sort keeps insertion order for equal timestamps
        records.sort_by_key(|r| r.consumed_at);
        records.truncate(limit);
        Ok(records)
    }

    async fn count(&self) -> StoreResult<u64> {
        Ok(self.records.lock().len() as u64)
    }

    async fn count_distinct_ids(&self) -> StoreResult<u64> {
        let records = self.records.lock();
        let mut ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Payload;

    fn consumed(number: i64, consumed_at: i64) -> Record {
        let mut record = Record::new(
            number,
            number,
            Payload {
                email: "a@b.c".to_string(),
                first_name: "A".to_string(),
                last_name: "B".to_string(),
            },
        );
        record.mark_consumed(consumed_at);
        record
    }

    #[tokio::test]
    async fn test_sorted_read_is_stable_on_ties() {
        let store = MemoryStore::new();
        store.insert_one(&consumed(0, 30)).await.unwrap();
        store.insert_one(&consumed(1, 10)).await.unwrap();
        store.insert_one(&consumed(2, 10)).await.unwrap();
        store.insert_one(&consumed(3, 20)).await.unwrap();

        let numbers: Vec<i64> = store
            .find_sorted_by_consumed_at(10)
            .await
            .unwrap()
            .iter()
            .map(|r| r.number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3, 0]);
    }

    #[tokio::test]
    async fn test_sorted_read_honors_limit() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.insert_one(&consumed(i, i)).await.unwrap();
        }
        let records = store.find_sorted_by_consumed_at(3).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].number, 2);
    }

    #[tokio::test]
    async fn test_rejects_unconsumed_records() {
        let store = MemoryStore::new();
        let mut record = consumed(0, 1);
        record.consumed_at = None;

        let err = store.insert_one(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::Unconsumed(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_reset_clears_previous_run() {
        let store = MemoryStore::with_records(vec![consumed(0, 1), consumed(1, 2)]);
        assert_eq!(store.count().await.unwrap(), 2);

        store.reset().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counts_duplicates() {
        let store = MemoryStore::new();
        let record = consumed(0, 1);
        store.insert_one(&record).await.unwrap();
        store.insert_one(&record).await.unwrap();
        store.insert_one(&consumed(1, 2)).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(store.count_distinct_ids().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MemoryStore::new().fail_on_insert(2);
        assert!(store.insert_one(&consumed(0, 1)).await.is_ok());
        assert!(matches!(
            store.insert_one(&consumed(1, 2)).await,
            Err(StoreError::Query(_))
        ));
        assert!(store.insert_one(&consumed(2, 3)).await.is_ok());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_insert_latency() {
        let store = MemoryStore::new().with_insert_latency(1_000..=2_000);
        let start = std::time::Instant::now();
        store.insert_one(&consumed(0, 1)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_micros(1_000));
    }
}
