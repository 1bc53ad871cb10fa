//! Write-side client abstraction and configuration.
//!
//! The writer stage drives a [`QueueClient`] through
//! `open → send* → close`. `open` covers the whole connection, session
//! and producer setup for the configured queue.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

use crate::config::{ConfigKeySpec, ConnectorConfig};
use crate::error::ConnectorError;

/// Session acknowledgement mode on the destination client.
///
/// Local to the destination session; independent of the source commit
/// protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcknowledgeMode {
    /// The session acknowledges automatically.
    #[default]
    Auto,
    /// The client acknowledges explicitly.
    Client,
    /// Lazy acknowledgement; duplicates tolerated.
    DupsOk,
}

impl AcknowledgeMode {
    /// Returns the configuration string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AcknowledgeMode::Auto => "auto",
            AcknowledgeMode::Client => "client",
            AcknowledgeMode::DupsOk => "dups-ok",
        }
    }
}

impl std::str::FromStr for AcknowledgeMode {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "auto_acknowledge" => Ok(AcknowledgeMode::Auto),
            "client" | "client_acknowledge" => Ok(AcknowledgeMode::Client),
            "dups-ok" | "dups_ok" | "dups_ok_acknowledge" => Ok(AcknowledgeMode::DupsOk),
            other => Err(ConnectorError::ConfigurationError(format!(
                "invalid acknowledge.mode: '{other}' (expected auto/client/dups-ok)"
            ))),
        }
    }
}

impl fmt::Display for AcknowledgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct QueueCredentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl fmt::Debug for QueueCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Destination client configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueClientConfig {
    /// Broker connection URL, if the client needs one.
    pub url: Option<String>,
    /// Target queue.
    pub queue_name: String,
    /// Connection credentials.
    pub credentials: Option<QueueCredentials>,
    /// Session acknowledgement mode.
    pub acknowledge_mode: AcknowledgeMode,
}

impl QueueClientConfig {
    /// Creates a config for `queue_name` with defaults.
    #[must_use]
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            url: None,
            queue_name: queue_name.into(),
            credentials: None,
            acknowledge_mode: AcknowledgeMode::Auto,
        }
    }

    /// Parses a [`QueueClientConfig`] from a [`ConnectorConfig`].
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if required keys are missing or values are invalid.
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, ConnectorError> {
        config.validate(&Self::config_keys())?;

        let queue_name = config.require("queue.name")?.to_string();
        let url = config.get("queue.url").map(String::from);

        let credentials = match (config.get("queue.username"), config.get("queue.password")) {
            (Some(u), Some(p)) => Some(QueueCredentials {
                username: u.to_string(),
                password: p.to_string(),
            }),
            (Some(_), None) | (None, Some(_)) => {
                return Err(ConnectorError::ConfigurationError(
                    "queue.username and queue.password must both be set".to_string(),
                ));
            }
            (None, None) => None,
        };

        let acknowledge_mode = match config.get("acknowledge.mode") {
            Some(s) => s.parse::<AcknowledgeMode>()?,
            None => AcknowledgeMode::Auto,
        };

        let cfg = Self {
            url,
            queue_name,
            credentials,
            acknowledge_mode,
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
        if self.queue_name.trim().is_empty() {
            return Err(ConnectorError::ConfigurationError(
                "queue.name cannot be empty".into(),
            ));
        }
        if let Some(creds) = &self.credentials {
            if creds.username.is_empty() {
                return Err(ConnectorError::ConfigurationError(
                    "queue.username cannot be empty".into(),
                ));
            }
        }
        Ok(())
    }

    /// Keys accepted by [`QueueClientConfig::from_config`].
    #[must_use]
    pub fn config_keys() -> Vec<ConfigKeySpec> {
        vec![
            ConfigKeySpec::required("queue.name", "Destination queue name"),
            ConfigKeySpec::optional("queue.url", "Broker connection URL", ""),
            ConfigKeySpec::optional("queue.username", "Connection user name", ""),
            ConfigKeySpec::optional("queue.password", "Connection password", ""),
            ConfigKeySpec::optional("acknowledge.mode", "Session acknowledgement mode", "auto"),
        ]
    }
}

/// A text message with string properties, the usual queue payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextMessage {
    /// Message body.
    pub text: String,
    /// Message properties.
    pub properties: BTreeMap<String, String>,
}

impl TextMessage {
    /// Creates a message with no properties.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Adds a string property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Write-side client owned by the writer stage.
///
/// # Lifecycle
///
/// 1. `open()` - Connect, start a session, create a producer for the queue
/// 2. `send()` - Write one message; returns once the client library acknowledged it
/// 3. `close()` - Release the connection (called on every exit path)
#[async_trait]
pub trait QueueClient: Send {
    /// Destination-ready message type.
    type Message: Send + 'static;

    /// Connects and prepares the producer.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the connection, session or producer cannot be created.
    async fn open(&mut self) -> Result<(), ConnectorError>;

    /// Writes one message.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::WriteError` if the destination did not accept it.
    async fn send(&mut self, message: Self::Message) -> Result<(), ConnectorError>;

    /// Releases the connection.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if cleanup fails.
    async fn close(&mut self) -> Result<(), ConnectorError>;

    /// Queue this client writes to, for logging.
    fn queue_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(extra: &[(&str, &str)]) -> ConnectorConfig {
        let mut config = ConnectorConfig::new();
        config.set("queue.name", "INBOUND.Q");
        for (k, v) in extra {
            config.set(*k, *v);
        }
        config
    }

    #[test]
    fn test_parse_defaults() {
        let cfg = QueueClientConfig::from_config(&make_config(&[])).unwrap();
        assert_eq!(cfg, QueueClientConfig::new("INBOUND.Q"));
        assert_eq!(cfg.acknowledge_mode, AcknowledgeMode::Auto);
    }

    #[test]
    fn test_parse_missing_queue() {
        let config = ConnectorConfig::new();
        assert!(matches!(
            QueueClientConfig::from_config(&config),
            Err(ConnectorError::MissingConfig(_))
        ));
    }

    #[test]
    fn test_parse_credentials() {
        let cfg = QueueClientConfig::from_config(&make_config(&[
            ("queue.url", "tcp://mq:1414"),
            ("queue.username", "srvbridge"),
            ("queue.password", "hunter2"),
            ("acknowledge.mode", "client"),
        ]))
        .unwrap();

        assert_eq!(cfg.url.as_deref(), Some("tcp://mq:1414"));
        let creds = cfg.credentials.as_ref().unwrap();
        assert_eq!(creds.username, "srvbridge");
        assert_eq!(cfg.acknowledge_mode, AcknowledgeMode::Client);
    }

    #[test]
    fn test_parse_partial_credentials() {
        let config = make_config(&[("queue.username", "srvbridge")]);
        assert!(matches!(
            QueueClientConfig::from_config(&config),
            Err(ConnectorError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_password_masked_in_debug() {
        let cfg = QueueClientConfig::from_config(&make_config(&[
            ("queue.username", "srvbridge"),
            ("queue.password", "hunter2"),
        ]))
        .unwrap();
        let debug = format!("{cfg:?}");
        assert!(debug.contains("srvbridge"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_acknowledge_mode_parsing() {
        assert_eq!(
            "AUTO_ACKNOWLEDGE".parse::<AcknowledgeMode>().unwrap(),
            AcknowledgeMode::Auto
        );
        assert_eq!(
            "dups_ok".parse::<AcknowledgeMode>().unwrap(),
            AcknowledgeMode::DupsOk
        );
        assert!("transacted".parse::<AcknowledgeMode>().is_err());
    }

    #[test]
    fn test_text_message_properties() {
        let msg = TextMessage::new("<xml/>").with_property("source", "events-0@12");
        assert_eq!(msg.properties.get("source").map(String::as_str), Some("events-0@12"));
    }
}
