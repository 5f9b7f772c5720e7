//! Record persistence
//!
//! [`RecordStore`] is the seam between the consumer pipeline and the
//! database. The PostgreSQL implementation is used for real runs and
//! [`MemoryStore`] backs the in-process tests.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::record::Record;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage for consumed records
///
/// Implementations must accept concurrent `insert_one` calls from many
/// workers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ===== Lifecycle =====

    /// Drop every record left over from a previous run
    async fn reset(&self) -> StoreResult<()>;

    // ===== Writes =====

    /// Persist a single consumed record
    ///
    /// Records without `consumed_at` are rejected with
    /// [`StoreError::Unconsumed`].
    async fn insert_one(&self, record: &Record) -> StoreResult<()>;

    // ===== Reads =====

    /// Up to `limit` records ordered by `consumed_at` ascending
    ///
    /// Ties on `consumed_at` come back in insertion order.
    async fn find_sorted_by_consumed_at(&self, limit: usize) -> StoreResult<Vec<Record>>;

    /// Total number of stored rows
    async fn count(&self) -> StoreResult<u64>;

    /// Number of distinct record ids stored
    async fn count_distinct_ids(&self) -> StoreResult<u64>;
}
