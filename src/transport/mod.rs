//! Message transport
//!
//! The pipeline only sees two seams: [`MessageSource`] on the consuming
//! side and [`RecordPublisher`] on the producing side. [`kafka`] backs
//! both with rdkafka; [`channel`] is an in-process queue used by tests.

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::Result;

pub mod channel;
pub mod kafka;

pub use channel::{ChannelPublisher, ChannelQueue, ChannelSource};
pub use kafka::{KafkaPublisher, KafkaSource};

/// A message as received from the transport, before decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

/// Where a published message ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

/// Resolves once the transport acknowledges (or gives up on) a message
pub type DeliveryFuture = BoxFuture<'static, Result<Delivery>>;

/// Source of inbound messages, shared by every consumer worker
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Wait for the next message
    ///
    /// Returns `Ok(None)` once the source is closed or exhausted.
    async fn recv(&self) -> Result<Option<InboundMessage>>;

    /// Stop delivering messages
    async fn close(&self) -> Result<()>;
}

/// Sink for outbound records
#[async_trait]
pub trait RecordPublisher: Send + Sync {
    /// Queue a message without waiting for the broker
    ///
    /// Enqueue order is the order the transport will write the messages in.
    fn enqueue(&self, key: &str, payload: &[u8]) -> Result<DeliveryFuture>;

    /// Wait until every queued message has been handed to the broker
    async fn flush(&self) -> Result<()>;
}
