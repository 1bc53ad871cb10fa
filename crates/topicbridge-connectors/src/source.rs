//! Read-side client abstraction.
//!
//! The reader stage drives a [`SourceClient`] through
//! `open → (poll → commit)* → close`. It never touches the client from
//! another task, so implementations need no internal locking.

use std::fmt;

use async_trait::async_trait;

use crate::error::ConnectorError;

/// Where a record sits in the source topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordPosition {
    /// Topic name.
    pub topic: String,
    /// Partition number.
    pub partition: i32,
    /// Offset of the record within the partition.
    pub offset: i64,
}

impl RecordPosition {
    /// Creates a new position.
    #[must_use]
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
        }
    }

    /// The offset to store when this record is committed (next to fetch).
    #[must_use]
    pub fn next_offset(&self) -> i64 {
        self.offset + 1
    }
}

impl fmt::Display for RecordPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}@{}", self.topic, self.partition, self.offset)
    }
}

/// One record pulled from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord<K, V> {
    /// Position of the record.
    pub position: RecordPosition,
    /// Decoded key, if the record had one.
    pub key: Option<K>,
    /// Decoded value.
    pub value: V,
}

impl<K, V> SourceRecord<K, V> {
    /// Creates a record without a key.
    #[must_use]
    pub fn new(position: RecordPosition, value: V) -> Self {
        Self {
            position,
            key: None,
            value,
        }
    }

    /// Sets the record key.
    #[must_use]
    pub fn with_key(mut self, key: K) -> Self {
        self.key = Some(key);
        self
    }
}

/// Read-side client owned by the reader stage.
///
/// # Lifecycle
///
/// 1. `open()` - Connect and assign every partition of the configured topic
/// 2. `poll()` - Return at most one record, waiting at most the poll timeout
/// 3. `commit()` - Synchronously commit one record's position
/// 4. `close()` - Release the client (called on every exit path)
#[async_trait]
pub trait SourceClient: Send {
    /// Decoded key type.
    type Key: Send;

    /// Decoded value type, forwarded to the writer.
    type Value: Send + 'static;

    /// Connects to the source.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the client cannot be created or assigned.
    async fn open(&mut self) -> Result<(), ConnectorError>;

    /// Polls for the next record.
    ///
    /// Hands out a single record per call so the reader never holds more
    /// than the one in flight. Returns `None` when nothing arrived within
    /// the poll timeout.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` on read or decode failure.
    async fn poll(
        &mut self,
    ) -> Result<Option<SourceRecord<Self::Key, Self::Value>>, ConnectorError>;

    /// Commits `position`, waiting for the source to acknowledge.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::CommitFailed` if the source rejects the commit.
    async fn commit(&mut self, position: &RecordPosition) -> Result<(), ConnectorError>;

    /// Releases the client.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if cleanup fails.
    async fn close(&mut self) -> Result<(), ConnectorError>;

    /// Topic this client reads, for logging.
    fn topic(&self) -> &str;
}
