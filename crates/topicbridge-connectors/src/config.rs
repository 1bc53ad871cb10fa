//! Client configuration types.
//!
//! Both stages receive their client settings as a flat string map, the
//! same shape a properties file or environment import produces:
//! - [`ConnectorConfig`]: key-value configuration with typed accessors
//! - [`ConfigKeySpec`]: declaration of a key a client accepts

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::ConnectorError;

/// Configuration for one read-side or write-side client.
#[derive(Debug, Clone, Default)]
pub struct ConnectorConfig {
    properties: HashMap<String, String>,
}

impl ConnectorConfig {
    /// Creates an empty config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a configuration property.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Gets a configuration property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Gets a required, non-blank configuration property.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::MissingConfig` if the key is not set or blank.
    pub fn require(&self, key: &str) -> Result<&str, ConnectorError> {
        self.get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConnectorError::MissingConfig(key.to_string()))
    }

    /// Gets a property parsed as the given type.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` if the value cannot be parsed.
    pub fn get_parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, ConnectorError>
    where
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(v) => v.trim().parse::<T>().map(Some).map_err(|e| {
                ConnectorError::ConfigurationError(format!("invalid value for '{key}': {e}"))
            }),
            None => Ok(None),
        }
    }

    /// Gets a millisecond property as a [`Duration`], falling back to `default_ms`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` if the value is not an integer.
    pub fn get_duration_ms(&self, key: &str, default_ms: u64) -> Result<Duration, ConnectorError> {
        Ok(Duration::from_millis(
            self.get_parsed::<u64>(key)?.unwrap_or(default_ms),
        ))
    }

    /// Returns properties with a given prefix, with the prefix stripped.
    #[must_use]
    pub fn properties_with_prefix(&self, prefix: &str) -> HashMap<String, String> {
        self.properties
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(prefix)
                    .map(|stripped| (stripped.to_string(), v.clone()))
            })
            .collect()
    }

    /// Checks that every required key in `specs` is present.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::MissingConfig` for the first missing required key.
    pub fn validate(&self, specs: &[ConfigKeySpec]) -> Result<(), ConnectorError> {
        for spec in specs.iter().filter(|s| s.required) {
            self.require(&spec.key)?;
        }
        Ok(())
    }
}

/// Declaration of a configuration key accepted by a client.
#[derive(Debug, Clone)]
pub struct ConfigKeySpec {
    /// The configuration key name.
    pub key: String,

    /// Human-readable description.
    pub description: String,

    /// Whether this key is required.
    pub required: bool,

    /// Default value if not provided.
    pub default: Option<String>,
}

impl ConfigKeySpec {
    /// Creates a required key spec.
    #[must_use]
    pub fn required(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            required: true,
            default: None,
        }
    }

    /// Creates an optional key spec with a default value.
    #[must_use]
    pub fn optional(
        key: impl Into<String>,
        description: impl Into<String>,
        default: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            required: false,
            default: Some(default.into()),
        }
    }
}
