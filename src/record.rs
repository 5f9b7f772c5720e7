//! Record model
//!
//! A [`Record`] is one unit of work flowing through the pipeline. On the
//! wire it is a JSON object without `consumed_at`; the consumer stamps
//! `consumed_at` once and only the persisted form carries it.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload fields carried through the pipeline unmodified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// A single record of the batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Globally unique identity (UUID v4), also used as the message key
    pub id: String,
    #[serde(flatten)]
    pub payload: Payload,
    /// Sequence number assigned by the producer, starting at 0
    pub number: i64,
    /// Publish time in microseconds since the epoch
    pub published_at: i64,
    /// Consumption time in microseconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<i64>,
}

/// Borrowed wire view of a record (never includes `consumed_at`)
#[derive(Serialize)]
struct WireRecord<'a> {
    id: &'a str,
    #[serde(flatten)]
    payload: &'a Payload,
    number: i64,
    published_at: i64,
}

impl Record {
    /// Create an unconsumed record with a fresh identity
    pub fn new(number: i64, published_at: i64, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload,
            number,
            published_at,
            consumed_at: None,
        }
    }

    /// Decode a wire payload
    ///
    /// A `consumed_at` field on the wire is discarded: consumption time is
    /// only ever assigned by the consumer.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let mut record: Record = serde_json::from_slice(bytes)?;
        record.consumed_at = None;
        Ok(record)
    }

    /// Encode the wire form of this record
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&WireRecord {
            id: &self.id,
            payload: &self.payload,
            number: self.number,
            published_at: self.published_at,
        })
    }

    /// Stamp the consumption time
    pub fn mark_consumed(&mut self, consumed_at: i64) {
        self.consumed_at = Some(consumed_at);
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }
}

/// Current wall-clock time in microseconds since the Unix epoch
pub fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

/// Wall clock that hands out strictly increasing microsecond timestamps
///
/// When records are emitted faster than the clock's resolution, or the
/// system clock steps backwards, the next timestamp is `last + 1`.
#[derive(Debug)]
pub struct PublishClock {
    last: AtomicI64,
}

impl Default for PublishClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishClock {
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(i64::MIN),
        }
    }

    /// Next publish timestamp based on the current wall clock
    pub fn next(&self) -> i64 {
        self.advance(now_micros())
    }

    /// Next publish timestamp given an observed wall-clock reading
    pub fn advance(&self, now: i64) -> i64 {
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = if now > last { now } else { last + 1 };
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(observed) => last = observed,
            }
        }
    }
}
