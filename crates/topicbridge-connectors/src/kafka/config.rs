//! Kafka reader configuration.

use std::collections::HashMap;
use std::time::Duration;

use rdkafka::config::ClientConfig;

use crate::codec::Codec;
use crate::config::{ConfigKeySpec, ConnectorConfig};
use crate::error::ConnectorError;

const DEFAULT_POLL_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_METADATA_TIMEOUT_MS: u64 = 10_000;

/// Settings applied after pass-through properties; they cannot be overridden.
const ENFORCED_PROPERTIES: [(&str, &str); 3] = [
    ("enable.auto.commit", "false"),
    ("enable.auto.offset.store", "false"),
    ("auto.offset.reset", "earliest"),
];

/// Configuration for [`KafkaTopicSource`](super::KafkaTopicSource).
///
/// The reader assigns itself every partition of a single topic and never
/// joins a consumer group; `group_id` only names the namespace offsets are
/// committed under.
#[derive(Debug, Clone)]
pub struct KafkaReaderConfig {
    /// Comma-separated broker list.
    pub bootstrap_servers: String,
    /// Topic to read.
    pub topic: String,
    /// Commit namespace.
    pub group_id: String,
    /// Maximum wait for one poll.
    pub poll_timeout: Duration,
    /// Maximum wait for topic metadata when assigning partitions.
    pub metadata_timeout: Duration,
    /// Key decoder.
    pub key_codec: Codec,
    /// Value decoder.
    pub value_codec: Codec,
    /// Extra librdkafka properties (`kafka.` prefix stripped).
    pub kafka_properties: HashMap<String, String>,
}

impl KafkaReaderConfig {
    /// Creates a config with defaults for everything but the brokers and topic.
    #[must_use]
    pub fn new(bootstrap_servers: impl Into<String>, topic: impl Into<String>) -> Self {
        let topic = topic.into();
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            group_id: default_group_id(&topic),
            topic,
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            metadata_timeout: Duration::from_millis(DEFAULT_METADATA_TIMEOUT_MS),
            key_codec: Codec::String,
            value_codec: Codec::String,
            kafka_properties: HashMap::new(),
        }
    }

    /// Parses a [`KafkaReaderConfig`] from a [`ConnectorConfig`].
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if required fields are missing or values are invalid.
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, ConnectorError> {
        config.validate(&Self::config_keys())?;

        let bootstrap_servers = config.require("bootstrap.servers")?.to_string();
        let topic = config.require("topic")?.to_string();

        let group_id = match config.get("group.id").map(str::trim) {
            Some(g) if !g.is_empty() => g.to_string(),
            _ => default_group_id(&topic),
        };

        let key_codec = parse_codec(config, "key.codec")?;
        let value_codec = parse_codec(config, "value.codec")?;

        let cfg = Self {
            bootstrap_servers,
            topic,
            group_id,
            poll_timeout: config.get_duration_ms("poll.timeout.ms", DEFAULT_POLL_TIMEOUT_MS)?,
            metadata_timeout: config
                .get_duration_ms("metadata.timeout.ms", DEFAULT_METADATA_TIMEOUT_MS)?,
            key_codec,
            value_codec,
            kafka_properties: config.properties_with_prefix("kafka."),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConnectorError> {
        if self.bootstrap_servers.trim().is_empty() {
            return Err(ConnectorError::ConfigurationError(
                "bootstrap.servers cannot be empty".into(),
            ));
        }
        if self.topic.trim().is_empty() {
            return Err(ConnectorError::ConfigurationError(
                "topic cannot be empty".into(),
            ));
        }
        if self.topic.contains(',') {
            return Err(ConnectorError::ConfigurationError(format!(
                "exactly one topic is read per reader, got '{}'",
                self.topic
            )));
        }
        if self.group_id.trim().is_empty() {
            return Err(ConnectorError::ConfigurationError(
                "group.id cannot be empty".into(),
            ));
        }
        if self.poll_timeout.is_zero() {
            return Err(ConnectorError::ConfigurationError(
                "poll.timeout.ms must be > 0".into(),
            ));
        }
        if self.metadata_timeout.is_zero() {
            return Err(ConnectorError::ConfigurationError(
                "metadata.timeout.ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Builds an rdkafka [`ClientConfig`] from this configuration.
    #[must_use]
    pub fn to_rdkafka_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("group.id", &self.group_id);

        for (key, value) in &self.kafka_properties {
            config.set(key, value);
        }
        for (key, value) in ENFORCED_PROPERTIES {
            config.set(key, value);
        }

        config
    }

    /// Keys accepted by [`KafkaReaderConfig::from_config`].
    #[must_use]
    pub fn config_keys() -> Vec<ConfigKeySpec> {
        vec![
            ConfigKeySpec::required("bootstrap.servers", "Kafka broker list"),
            ConfigKeySpec::required("topic", "Topic to read (exactly one)"),
            ConfigKeySpec::optional("group.id", "Offset commit namespace", "topicbridge-<topic>"),
            ConfigKeySpec::optional("poll.timeout.ms", "Maximum wait per poll", "10000"),
            ConfigKeySpec::optional(
                "metadata.timeout.ms",
                "Maximum wait for topic metadata",
                "10000",
            ),
            ConfigKeySpec::optional("key.codec", "Key decoder", "string"),
            ConfigKeySpec::optional("value.codec", "Value decoder", "string"),
        ]
    }
}

fn default_group_id(topic: &str) -> String {
    format!("topicbridge-{topic}")
}

fn parse_codec(config: &ConnectorConfig, key: &str) -> Result<Codec, ConnectorError> {
    match config.get(key) {
        Some(s) => s
            .parse::<Codec>()
            .map_err(|e| ConnectorError::ConfigurationError(format!("{key}: {e}"))),
        None => Ok(Codec::String),
    }
}
