//! Run configuration
//!
//! Settings are read from environment variables. Anything unset falls back
//! to the defaults in [`crate::constants`]. `from_lookup` takes the lookup
//! function explicitly so tests don't have to touch the process environment.

use std::env;
use std::time::Duration;

use uuid::Uuid;

use crate::constants::*;
use crate::error::{HarnessError, Result};

/// Kafka client settings shared by the producer and the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaSettings {
    /// Bootstrap servers (`bootstrap.servers`)
    pub bootstrap_servers: String,
    /// Security protocol (`security.protocol`)
    pub security_protocol: String,
    pub topic: String,
    /// Partition every produced record is pinned to (`None` = partitioner decides)
    pub partition: Option<i32>,
    /// Consumer group id, fresh per run unless overridden
    pub group_id: String,
    pub client_id: String,
    /// `auto.offset.reset` for the consumer group
    pub auto_offset_reset: String,
    pub max_poll_interval_ms: u64,
    /// Consumer group session timeout, never above `max_poll_interval_ms`
    pub session_timeout_ms: u64,
    /// Per-message delivery timeout for the producer
    pub delivery_timeout_ms: u64,
}

/// PostgreSQL settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// libpq-style connection string
    pub database_url: String,
    /// Overrides the user in `database_url`
    pub user: Option<String>,
    /// Overrides the password in `database_url`
    pub password: Option<String>,
    /// Table the batch is persisted into
    pub table: String,
}

/// Complete configuration for one harness run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub kafka: KafkaSettings,
    pub store: StoreSettings,
    /// Number of records per batch (N)
    pub batch_size: u64,
    /// Number of consumer workers (W)
    pub workers: usize,
    /// Deadline for the completion signal
    pub completion_timeout: Duration,
}

impl HarnessConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let security_protocol = get("KAFKA_SECURITY_PROTOCOL")
            .unwrap_or_else(|| DEFAULT_SECURITY_PROTOCOL.to_string())
            .to_uppercase();
        if !SECURITY_PROTOCOLS.contains(&security_protocol.as_str()) {
            return Err(HarnessError::InvalidConfig(format!(
                "KAFKA_SECURITY_PROTOCOL must be one of {:?}, got '{}'",
                SECURITY_PROTOCOLS, security_protocol
            )));
        }

        let partition = match get("KAFKA_PARTITION") {
            None => Some(DEFAULT_PARTITION),
            Some(v) if v.eq_ignore_ascii_case("any") => None,
            Some(v) => {
                let partition: i32 = parse_number("KAFKA_PARTITION", &v)?;
                if partition < 0 {
                    return Err(HarnessError::InvalidConfig(format!(
                        "KAFKA_PARTITION must be non-negative, got {}",
                        partition
                    )));
                }
                Some(partition)
            }
        };

        let auto_offset_reset = get("KAFKA_AUTO_OFFSET_RESET")
            .unwrap_or_else(|| DEFAULT_AUTO_OFFSET_RESET.to_string())
            .to_lowercase();
        if auto_offset_reset != "earliest" && auto_offset_reset != "latest" {
            return Err(HarnessError::InvalidConfig(format!(
                "KAFKA_AUTO_OFFSET_RESET must be 'earliest' or 'latest', got '{}'",
                auto_offset_reset
            )));
        }

        let kafka = KafkaSettings {
            bootstrap_servers: get("KAFKA_DSN").unwrap_or_else(|| DEFAULT_KAFKA_DSN.to_string()),
            security_protocol,
            topic: get("KAFKA_TOPIC").unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            partition,
            // A fresh group per run always starts from the configured reset point
            group_id: get("KAFKA_GROUP_ID").unwrap_or_else(|| Uuid::new_v4().to_string()),
            client_id: get("KAFKA_CLIENT_ID").unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            auto_offset_reset,
            max_poll_interval_ms: positive(
                "KAFKA_MAX_POLL_INTERVAL_MS",
                get("KAFKA_MAX_POLL_INTERVAL_MS"),
                DEFAULT_MAX_POLL_INTERVAL_MS,
            )?,
            session_timeout_ms: positive(
                "KAFKA_SESSION_TIMEOUT_MS",
                get("KAFKA_SESSION_TIMEOUT_MS"),
                DEFAULT_SESSION_TIMEOUT_MS,
            )?,
            delivery_timeout_ms: positive(
                "KAFKA_DELIVERY_TIMEOUT_MS",
                get("KAFKA_DELIVERY_TIMEOUT_MS"),
                DEFAULT_DELIVERY_TIMEOUT_MS,
            )?,
        };

        // librdkafka refuses to create a consumer otherwise
        if kafka.max_poll_interval_ms < kafka.session_timeout_ms {
            return Err(HarnessError::InvalidConfig(format!(
                "KAFKA_MAX_POLL_INTERVAL_MS ({}) must be >= KAFKA_SESSION_TIMEOUT_MS ({})",
                kafka.max_poll_interval_ms, kafka.session_timeout_ms
            )));
        }

        let table = get("DATABASE_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string());
        validate_identifier(&table)?;

        let store = StoreSettings {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            user: get("DATABASE_USER"),
            password: get("DATABASE_PASSWORD"),
            table,
        };

        let batch_size = positive("BATCH_SIZE", get("BATCH_SIZE"), DEFAULT_BATCH_SIZE)?;
        let workers = positive("WORKERS", get("WORKERS"), DEFAULT_WORKERS as u64)? as usize;
        let completion_timeout = Duration::from_millis(positive(
            "COMPLETION_TIMEOUT_MS",
            get("COMPLETION_TIMEOUT_MS"),
            DEFAULT_COMPLETION_TIMEOUT_MS,
        )?);

        Ok(Self {
            kafka,
            store,
            batch_size,
            workers,
            completion_timeout,
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        HarnessError::InvalidConfig(format!("{} must be an integer, got '{}'", key, value))
    })
}

fn positive(key: &str, value: Option<String>, default: u64) -> Result<u64> {
    match value {
        None => Ok(default),
        Some(v) => {
            let n: u64 = parse_number(key, &v)?;
            if n == 0 {
                return Err(HarnessError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    key
                )));
            }
            Ok(n)
        }
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest || name.len() > MAX_IDENTIFIER_LEN {
        return Err(HarnessError::InvalidConfig(format!(
            "'{}' is not a valid table name",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<HarnessConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HarnessConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.kafka.bootstrap_servers, DEFAULT_KAFKA_DSN);
        assert_eq!(config.kafka.security_protocol, "PLAINTEXT");
        assert_eq!(config.kafka.topic, DEFAULT_TOPIC);
        assert_eq!(config.kafka.partition, Some(DEFAULT_PARTITION));
        assert_eq!(config.kafka.auto_offset_reset, "earliest");
        assert_eq!(config.store.table, DEFAULT_TABLE);
        assert_eq!(config.store.user, None);
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.workers, 10);
        assert_eq!(
            config.completion_timeout,
            Duration::from_millis(DEFAULT_COMPLETION_TIMEOUT_MS)
        );
        assert!(Uuid::parse_str(&config.kafka.group_id).is_ok());
    }

    #[test]
    fn test_group_id_is_fresh_per_load() {
        let a = config_from(&[]).unwrap();
        let b = config_from(&[]).unwrap();
        assert_ne!(a.kafka.group_id, b.kafka.group_id);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("KAFKA_DSN", "broker-1:9092,broker-2:9092"),
            ("KAFKA_SECURITY_PROTOCOL", "sasl_ssl"),
            ("KAFKA_TOPIC", "orders"),
            ("KAFKA_PARTITION", "0"),
            ("KAFKA_GROUP_ID", "verifier"),
            ("KAFKA_AUTO_OFFSET_RESET", "LATEST"),
            ("BATCH_SIZE", "50"),
            ("WORKERS", "3"),
            ("COMPLETION_TIMEOUT_MS", "1500"),
            ("DATABASE_URL", "host=db user=app"),
            ("DATABASE_USER", "root"),
            ("DATABASE_PASSWORD", "password"),
            ("DATABASE_TABLE", "order_check_runs"),
        ])
        .unwrap();

        assert_eq!(config.kafka.bootstrap_servers, "broker-1:9092,broker-2:9092");
        assert_eq!(config.kafka.security_protocol, "SASL_SSL");
        assert_eq!(config.kafka.topic, "orders");
        assert_eq!(config.kafka.partition, Some(0));
        assert_eq!(config.kafka.group_id, "verifier");
        assert_eq!(config.kafka.auto_offset_reset, "latest");
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.workers, 3);
        assert_eq!(config.completion_timeout, Duration::from_millis(1500));
        assert_eq!(config.store.database_url, "host=db user=app");
        assert_eq!(config.store.user.as_deref(), Some("root"));
        assert_eq!(config.store.password.as_deref(), Some("password"));
        assert_eq!(config.store.table, "order_check_runs");
    }

    #[test]
    fn test_any_partition() {
        let config = config_from(&[("KAFKA_PARTITION", "any")]).unwrap();
        assert_eq!(config.kafka.partition, None);
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = config_from(&[("KAFKA_TOPIC", "  "), ("WORKERS", "")]).unwrap();
        assert_eq!(config.kafka.topic, DEFAULT_TOPIC);
        assert_eq!(config.workers, DEFAULT_WORKERS);
    }

    #[test]
    fn test_rejects_zero_batch_and_workers() {
        let err = config_from(&[("BATCH_SIZE", "0")]).unwrap_err();
        assert!(err.to_string().contains("BATCH_SIZE"));

        let err = config_from(&[("WORKERS", "0")]).unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_non_numeric_values() {
        let err = config_from(&[("BATCH_SIZE", "lots")]).unwrap_err();
        assert!(err.to_string().contains("must be an integer"));

        assert!(config_from(&[("KAFKA_PARTITION", "-1")]).is_err());
        assert!(config_from(&[("WORKERS", "-4")]).is_err());
    }

    #[test]
    fn test_rejects_unknown_protocol_and_reset() {
        assert!(config_from(&[("KAFKA_SECURITY_PROTOCOL", "HTTP")]).is_err());
        assert!(config_from(&[("KAFKA_AUTO_OFFSET_RESET", "none")]).is_err());
    }

    #[test]
    fn test_default_session_timeout_fits_poll_interval() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.kafka.session_timeout_ms, DEFAULT_SESSION_TIMEOUT_MS);
        assert!(config.kafka.session_timeout_ms <= config.kafka.max_poll_interval_ms);
    }

    #[test]
    fn test_rejects_poll_interval_below_session_timeout() {
        let err = config_from(&[("KAFKA_MAX_POLL_INTERVAL_MS", "5000")]).unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));
        assert!(err.to_string().contains("KAFKA_SESSION_TIMEOUT_MS"));

        let err = config_from(&[("KAFKA_SESSION_TIMEOUT_MS", "45000")]).unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));

        let config = config_from(&[
            ("KAFKA_SESSION_TIMEOUT_MS", "45000"),
            ("KAFKA_MAX_POLL_INTERVAL_MS", "300000"),
        ])
        .unwrap();
        assert_eq!(config.kafka.session_timeout_ms, 45_000);
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("messages").is_ok());
        assert!(validate_identifier("_runs_2024").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1messages").is_err());
        assert!(validate_identifier("messages; DROP TABLE users").is_err());
        assert!(validate_identifier("public.messages").is_err());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
    }
}
