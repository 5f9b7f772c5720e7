//! In-process transport
//!
//! A single unbounded queue standing in for one topic partition: messages
//! come out in exactly the order they were enqueued and get consecutive
//! offsets. Any bytes can be published, which lets tests feed the
//! consumer malformed payloads.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use futures::future;
use futures::FutureExt;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, watch, Mutex};

use super::{Delivery, DeliveryFuture, InboundMessage, MessageSource, RecordPublisher};
use crate::error::{HarnessError, Result};

/// Builder for a connected publisher/source pair
pub struct ChannelQueue;

impl ChannelQueue {
    /// Create a queue for `partition`
    pub fn new(partition: i32) -> (ChannelPublisher, ChannelSource) {
        let (tx, rx) = mpsc::unbounded_channel();
        let publisher = ChannelPublisher {
            sender: SyncMutex::new(Some(tx)),
            partition,
            next_offset: AtomicI64::new(0),
        };
        let (closed, _) = watch::channel(false);
        let source = ChannelSource {
            receiver: Mutex::new(rx),
            closed,
        };
        (publisher, source)
    }
}

pub struct ChannelPublisher {
    sender: SyncMutex<Option<mpsc::UnboundedSender<InboundMessage>>>,
    partition: i32,
    next_offset: AtomicI64,
}

impl ChannelPublisher {
    /// Publish a raw payload, bypassing record encoding
    pub fn publish_raw(&self, key: Option<&[u8]>, payload: &[u8]) -> Result<Delivery> {
        let sender = self.sender.lock();
        let sender = sender
            .as_ref()
            .ok_or_else(|| HarnessError::Transport("publisher is closed".to_string()))?;

        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        sender
            .send(InboundMessage {
                key: key.map(|k| k.to_vec()),
                payload: payload.to_vec(),
                partition: self.partition,
                offset,
            })
            .map_err(|_| HarnessError::Transport("source dropped".to_string()))?;

        Ok(Delivery {
            partition: self.partition,
            offset,
        })
    }

    /// Drop the sending half; the source drains what is queued and then ends
    pub fn close(&self) {
        self.sender.lock().take();
    }

    /// Number of messages published so far
    pub fn published(&self) -> i64 {
        self.next_offset.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordPublisher for ChannelPublisher {
    fn enqueue(&self, key: &str, payload: &[u8]) -> Result<DeliveryFuture> {
        let delivery = self.publish_raw(Some(key.as_bytes()), payload)?;
        Ok(future::ready(Ok(delivery)).boxed())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

pub struct ChannelSource {
    receiver: Mutex<mpsc::UnboundedReceiver<InboundMessage>>,
    closed: watch::Sender<bool>,
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn recv(&self) -> Result<Option<InboundMessage>> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Ok(None);
        }

        tokio::select! {
            _ = closed.changed() => Ok(None),
            // Holding the lock across the await hands out messages one worker at a time
            message = async { self.receiver.lock().await.recv().await } => Ok(message),
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.send_replace(true);
        Ok(())
    }
}
