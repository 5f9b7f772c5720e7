//! rdkafka-backed transport
//!
//! Both clients are configured from [`KafkaSettings`]. Offsets are never
//! committed: every run uses a fresh consumer group and reads the topic
//! from the configured reset point.

use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{Delivery, DeliveryFuture, InboundMessage, MessageSource, RecordPublisher};
use crate::config::KafkaSettings;
use crate::error::{HarnessError, Result};

/// Settings shared by producer and consumer clients
fn base_config(settings: &KafkaSettings) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", &settings.bootstrap_servers)
        .set("security.protocol", &settings.security_protocol)
        .set("client.id", &settings.client_id);
    config
}

/// Poll errors that retrying will not clear
fn is_fatal_poll_error(e: &KafkaError) -> bool {
    matches!(
        e.rdkafka_error_code(),
        Some(
            RDKafkaErrorCode::TopicAuthorizationFailed
                | RDKafkaErrorCode::GroupAuthorizationFailed
                | RDKafkaErrorCode::ClusterAuthorizationFailed
                | RDKafkaErrorCode::SaslAuthenticationFailed
                | RDKafkaErrorCode::Authentication
                | RDKafkaErrorCode::Fatal
        )
    )
}

// ===== Consumer =====

/// Consumer side: one subscribed [`StreamConsumer`] shared by all workers
pub struct KafkaSource {
    consumer: StreamConsumer,
    closed: watch::Sender<bool>,
}

impl KafkaSource {
    /// Create the consumer and subscribe to the configured topic
    pub fn new(settings: &KafkaSettings) -> Result<Self> {
        let consumer: StreamConsumer = base_config(settings)
            .set("group.id", &settings.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &settings.auto_offset_reset)
            .set(
                "max.poll.interval.ms",
                settings.max_poll_interval_ms.to_string(),
            )
            .set(
                "session.timeout.ms",
                settings.session_timeout_ms.to_string(),
            )
            .create()
            .map_err(|e| {
                HarnessError::TransportSetup(format!("Failed to create consumer: {}", e))
            })?;

        consumer.subscribe(&[&settings.topic]).map_err(|e| {
            HarnessError::TransportSetup(format!(
                "Failed to subscribe to '{}': {}",
                settings.topic, e
            ))
        })?;

        info!(
            topic = %settings.topic,
            group_id = %settings.group_id,
            "Subscribed consumer"
        );

        let (closed, _) = watch::channel(false);
        Ok(Self { consumer, closed })
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn recv(&self) -> Result<Option<InboundMessage>> {
        let mut closed = self.closed.subscribe();

        loop {
            if *closed.borrow() {
                return Ok(None);
            }

            tokio::select! {
                _ = closed.changed() => return Ok(None),
                received = self.consumer.recv() => match received {
                    Ok(message) => {
                        return Ok(Some(InboundMessage {
                            key: message.key().map(|k| k.to_vec()),
                            payload: message.payload().map(|p| p.to_vec()).unwrap_or_default(),
                            partition: message.partition(),
                            offset: message.offset(),
                        }));
                    }
                    Err(e) if is_fatal_poll_error(&e) => {
                        return Err(HarnessError::Transport(format!("Kafka poll error: {}", e)));
                    }
                    // Rebalances and broker restarts do not end the run
                    Err(e) => warn!("Kafka poll error: {}", e),
                },
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.send_replace(true);
        self.consumer.unsubscribe();
        debug!("Consumer unsubscribed");
        Ok(())
    }
}

// ===== Producer =====

/// Producer side: a [`FutureProducer`] pinned to one topic (and optionally one partition)
pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
    partition: Option<i32>,
    delivery_timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(settings: &KafkaSettings) -> Result<Self> {
        let producer: FutureProducer = base_config(settings)
            .set(
                "message.timeout.ms",
                settings.delivery_timeout_ms.to_string(),
            )
            .create()
            .map_err(|e| {
                HarnessError::TransportSetup(format!("Failed to create producer: {}", e))
            })?;

        info!(
            topic = %settings.topic,
            partition = ?settings.partition,
            "Created producer"
        );

        Ok(Self {
            producer,
            topic: settings.topic.clone(),
            partition: settings.partition,
            delivery_timeout: Duration::from_millis(settings.delivery_timeout_ms),
        })
    }
}

#[async_trait]
impl RecordPublisher for KafkaPublisher {
    fn enqueue(&self, key: &str, payload: &[u8]) -> Result<DeliveryFuture> {
        let mut record = FutureRecord::to(&self.topic).key(key).payload(payload);
        if let Some(partition) = self.partition {
            record = record.partition(partition);
        }

        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(e, _)| HarnessError::Transport(format!("Failed to enqueue: {}", e)))?;

        Ok(async move {
            match delivery.await {
                Ok(Ok((partition, offset))) => Ok(Delivery { partition, offset }),
                Ok(Err((e, _))) => Err(HarnessError::Transport(e.to_string())),
                Err(_) => Err(HarnessError::Transport(
                    "producer dropped before delivery".to_string(),
                )),
            }
        }
        .boxed())
    }

    async fn flush(&self) -> Result<()> {
        let producer = self.producer.clone();
        let timeout = self.delivery_timeout;

        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| HarnessError::Transport(format!("Flush task failed: {}", e)))?
            .map_err(|e| HarnessError::Transport(format!("Flush failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;

    fn default_settings() -> KafkaSettings {
        HarnessConfig::from_lookup(|_| None).unwrap().kafka
    }

    #[tokio::test]
    async fn test_consumer_creates_from_default_config() {
        // Client creation and subscribe do not contact the broker
        let source = KafkaSource::new(&default_settings());
        assert!(source.is_ok(), "{:?}", source.err());

        let source = source.unwrap();
        source.close().await.unwrap();
        assert!(source.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_consumer_creates_with_long_session_timeout() {
        let mut settings = default_settings();
        settings.session_timeout_ms = 45_000;
        settings.max_poll_interval_ms = 300_000;

        assert!(KafkaSource::new(&settings).is_ok());
    }

    #[tokio::test]
    async fn test_publisher_creates_from_default_config() {
        let publisher = KafkaPublisher::new(&default_settings());
        assert!(publisher.is_ok(), "{:?}", publisher.err());
    }

    #[tokio::test]
    async fn test_invalid_client_setting_is_transport_setup() {
        let mut settings = default_settings();
        settings.security_protocol = "bogus".to_string();

        assert!(matches!(
            KafkaSource::new(&settings),
            Err(HarnessError::TransportSetup(_))
        ));
        assert!(matches!(
            KafkaPublisher::new(&settings),
            Err(HarnessError::TransportSetup(_))
        ));
    }

    #[test]
    fn test_fatal_poll_errors() {
        for code in [
            RDKafkaErrorCode::TopicAuthorizationFailed,
            RDKafkaErrorCode::GroupAuthorizationFailed,
            RDKafkaErrorCode::SaslAuthenticationFailed,
            RDKafkaErrorCode::Fatal,
        ] {
            assert!(
                is_fatal_poll_error(&KafkaError::MessageConsumption(code)),
                "{:?}",
                code
            );
        }

        for code in [
            RDKafkaErrorCode::BrokerTransportFailure,
            RDKafkaErrorCode::AllBrokersDown,
            RDKafkaErrorCode::RebalanceInProgress,
        ] {
            assert!(
                !is_fatal_poll_error(&KafkaError::MessageConsumption(code)),
                "{:?}",
                code
            );
        }
        assert!(!is_fatal_poll_error(&KafkaError::NoMessageReceived));
    }
}
