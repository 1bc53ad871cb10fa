//! Kafka read-side client.
//!
//! Provides [`KafkaTopicSource`], a [`SourceClient`] that reads one topic
//! with explicit assignment of all its partitions, one record per poll,
//! and synchronous per-record offset commits.
//!
//! # Usage
//!
//! ```rust,ignore
//! use topicbridge_connectors::kafka::{KafkaReaderConfig, KafkaTopicSource};
//! use topicbridge_connectors::TopicReader;
//!
//! let config = KafkaReaderConfig::from_config(&connector_config)?;
//! let reader = TopicReader::new(KafkaTopicSource::new(config));
//! ```
//!
//! [`SourceClient`]: crate::source::SourceClient

pub mod config;
pub mod offsets;
pub mod source;

pub use config::KafkaReaderConfig;
pub use offsets::CommittedOffsets;
pub use source::KafkaTopicSource;
