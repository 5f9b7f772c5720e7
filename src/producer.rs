//! Producer driver
//!
//! Generates the ordered batch and publishes it. Records are enqueued as
//! soon as they are generated, so `published_at` is taken immediately
//! before the transport sees the record; acknowledgments are awaited only
//! once the whole batch is queued.

use std::sync::Arc;

use futures::future::try_join_all;
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::error::{HarnessError, Result};
use crate::record::{Payload, PublishClock, Record};
use crate::transport::{Delivery, RecordPublisher};

const FIRST_NAMES: &[&str] = &[
    "Ada", "Alan", "Barbara", "Claude", "Dennis", "Edsger", "Frances", "Grace", "Hedy", "Ivan",
    "Jean", "Ken", "Leslie", "Margaret", "Niklaus", "Radia", "Sophie", "Tony",
];

const LAST_NAMES: &[&str] = &[
    "Allen", "Backus", "Cerf", "Dijkstra", "Hamilton", "Hoare", "Hopper", "Kay", "Knuth",
    "Lamport", "Liskov", "Lovelace", "Perlman", "Ritchie", "Shannon", "Thompson", "Turing",
    "Wirth",
];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net"];

/// Iterator over the records of one batch
///
/// `number` runs from 0 to `size - 1`. `published_at` is read from the
/// publish clock when each record is yielded, not when the generator is
/// created.
pub struct BatchGenerator {
    size: u64,
    next: u64,
    clock: PublishClock,
    rng: StdRng,
}

impl BatchGenerator {
    pub fn new(size: u64) -> Self {
        Self::with_rng(size, StdRng::from_entropy())
    }

    /// Generator with reproducible payloads
    pub fn seeded(size: u64, seed: u64) -> Self {
        Self::with_rng(size, StdRng::seed_from_u64(seed))
    }

    fn with_rng(size: u64, rng: StdRng) -> Self {
        Self {
            size,
            next: 0,
            clock: PublishClock::new(),
            rng,
        }
    }

    fn fake_payload(&mut self) -> Payload {
        let first = FIRST_NAMES.choose(&mut self.rng).copied().unwrap_or("Ada");
        let last = LAST_NAMES.choose(&mut self.rng).copied().unwrap_or("Lovelace");
        let domain = EMAIL_DOMAINS
            .choose(&mut self.rng)
            .copied()
            .unwrap_or("example.com");
        let suffix: u16 = self.rng.gen_range(1..10_000);

        Payload {
            email: format!(
                "{}.{}{}@{}",
                first.to_lowercase(),
                last.to_lowercase(),
                suffix,
                domain
            ),
            first_name: first.to_string(),
            last_name: last.to_string(),
        }
    }
}

impl Iterator for BatchGenerator {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.next >= self.size {
            return None;
        }
        let number = self.next as i64;
        self.next += 1;

        let payload = self.fake_payload();
        Some(Record::new(number, self.clock.next(), payload))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.size - self.next) as usize;
        (remaining, Some(remaining))
    }
}

/// What the producer handed to the transport
#[derive(Debug, Clone)]
pub struct BatchSummary {
    /// Records in publish order
    pub records: Vec<Record>,
    /// Broker placement of each record, same order as `records`
    pub deliveries: Vec<Delivery>,
}

impl BatchSummary {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Publishes a batch through a [`RecordPublisher`]
pub struct ProducerDriver {
    publisher: Arc<dyn RecordPublisher>,
}

impl ProducerDriver {
    pub fn new(publisher: Arc<dyn RecordPublisher>) -> Self {
        Self { publisher }
    }

    /// Enqueue every record, then wait for all acknowledgments and flush
    pub async fn publish(&self, batch: impl Iterator<Item = Record>) -> Result<BatchSummary> {
        let mut records = Vec::with_capacity(batch.size_hint().0);
        let mut acks = Vec::with_capacity(batch.size_hint().0);

        for record in batch {
            let bytes = record
                .encode()
                .map_err(|e| HarnessError::Encoding(e.to_string()))?;
            let number = record.number;

            let ack = self.publisher.enqueue(&record.id, &bytes)?.map(move |delivery| {
                delivery.map_err(|e| HarnessError::DeliveryFailed {
                    number,
                    reason: e.to_string(),
                })
            });
            acks.push(ack);
            records.push(record);
        }

        debug!(queued = records.len(), "Batch queued, waiting for acknowledgments");

        let deliveries = try_join_all(acks).await?;
        self.publisher.flush().await?;

        info!(records = records.len(), "Batch delivered");

        Ok(BatchSummary {
            records,
            deliveries,
        })
    }
}
