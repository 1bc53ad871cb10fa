//! Kafka read-side client.
//!
//! [`KafkaTopicSource`] reads a single topic through rdkafka's
//! `StreamConsumer`. It assigns itself every partition of the topic
//! instead of subscribing, so it never joins a consumer group and
//! competes with no other member for partitions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use tracing::{debug, info, warn};

use super::config::KafkaReaderConfig;
use super::offsets::{assignment_list, commit_list, CommittedOffsets};
use crate::codec::Payload;
use crate::error::ConnectorError;
use crate::source::{RecordPosition, SourceClient, SourceRecord};

/// Kafka topic reader with explicit partition assignment and synchronous commits.
pub struct KafkaTopicSource {
    config: KafkaReaderConfig,
    consumer: Option<Arc<StreamConsumer>>,
    partitions: Vec<i32>,
    committed: CommittedOffsets,
}

impl KafkaTopicSource {
    /// Creates an unopened reader.
    #[must_use]
    pub fn new(config: KafkaReaderConfig) -> Self {
        Self {
            config,
            consumer: None,
            partitions: Vec::new(),
            committed: CommittedOffsets::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &KafkaReaderConfig {
        &self.config
    }

    /// Partitions assigned by the last `open`.
    #[must_use]
    pub fn partitions(&self) -> &[i32] {
        &self.partitions
    }

    /// Offsets committed since `open`.
    #[must_use]
    pub fn committed(&self) -> &CommittedOffsets {
        &self.committed
    }

    fn decode(&self, msg: &BorrowedMessage<'_>) -> Result<SourceRecord<Payload, Payload>, ConnectorError> {
        let position = RecordPosition::new(msg.topic(), msg.partition(), msg.offset());
        let value = self.config.value_codec.decode(msg.payload())?;
        let key = match msg.key() {
            Some(k) => Some(self.config.key_codec.decode(Some(k))?),
            None => None,
        };
        Ok(SourceRecord {
            position,
            key,
            value,
        })
    }
}

#[async_trait]
impl SourceClient for KafkaTopicSource {
    type Key = Payload;
    type Value = Payload;

    async fn open(&mut self) -> Result<(), ConnectorError> {
        info!(
            brokers = %self.config.bootstrap_servers,
            topic = %self.config.topic,
            group_id = %self.config.group_id,
            value_codec = %self.config.value_codec,
            "opening Kafka reader"
        );

        let consumer: StreamConsumer = self.config.to_rdkafka_config().create().map_err(|e| {
            ConnectorError::ConnectionFailed(format!("failed to create consumer: {e}"))
        })?;
        let consumer = Arc::new(consumer);

        let partitions = {
            let consumer = Arc::clone(&consumer);
            let topic = self.config.topic.clone();
            let timeout = self.config.metadata_timeout;
            tokio::task::spawn_blocking(move || topic_partitions(&consumer, &topic, timeout))
                .await
                .map_err(|e| ConnectorError::Internal(format!("metadata task failed: {e}")))??
        };

        consumer
            .assign(&assignment_list(&self.config.topic, &partitions)?)
            .map_err(|e| ConnectorError::ConnectionFailed(format!("failed to assign partitions: {e}")))?;

        info!(
            topic = %self.config.topic,
            partitions = partitions.len(),
            "assigned all partitions"
        );
        self.partitions = partitions;
        self.committed = CommittedOffsets::new();
        self.consumer = Some(consumer);
        Ok(())
    }

    async fn poll(&mut self) -> Result<Option<SourceRecord<Payload, Payload>>, ConnectorError> {
        let consumer = self.consumer.as_ref().ok_or(ConnectorError::Closed)?;

        match tokio::time::timeout(self.config.poll_timeout, consumer.recv()).await {
            Ok(Ok(msg)) => {
                let record = self.decode(&msg)?;
                debug!(position = %record.position, "polled record");
                Ok(Some(record))
            }
            Ok(Err(e)) => Err(ConnectorError::ReadError(format!("Kafka consumer error: {e}"))),
            Err(_) => Ok(None),
        }
    }

    async fn commit(&mut self, position: &RecordPosition) -> Result<(), ConnectorError> {
        let consumer = Arc::clone(self.consumer.as_ref().ok_or(ConnectorError::Closed)?);
        let tpl = commit_list(position)?;

        // a synchronous commit waits for the broker round trip
        tokio::task::spawn_blocking(move || consumer.commit(&tpl, CommitMode::Sync))
            .await
            .map_err(|e| ConnectorError::Internal(format!("commit task failed: {e}")))?
            .map_err(|e| ConnectorError::CommitFailed(format!("{position}: {e}")))?;

        self.committed.record(position);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        if let Some(consumer) = self.consumer.take() {
            info!(
                topic = %self.config.topic,
                committed_partitions = self.committed.partition_count(),
                "closing Kafka reader"
            );
            if let Err(e) = consumer.unassign() {
                warn!(error = %e, "failed to unassign partitions");
            }
        }
        Ok(())
    }

    fn topic(&self) -> &str {
        &self.config.topic
    }
}

impl std::fmt::Debug for KafkaTopicSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaTopicSource")
            .field("topic", &self.config.topic)
            .field("group_id", &self.config.group_id)
            .field("open", &self.consumer.is_some())
            .field("partitions", &self.partitions)
            .finish_non_exhaustive()
    }
}

fn topic_partitions(
    consumer: &StreamConsumer,
    topic: &str,
    timeout: Duration,
) -> Result<Vec<i32>, ConnectorError> {
    let metadata = consumer.fetch_metadata(Some(topic), timeout).map_err(|e| {
        ConnectorError::ConnectionFailed(format!("failed to fetch metadata for '{topic}': {e}"))
    })?;

    let entry = metadata
        .topics()
        .iter()
        .find(|t| t.name() == topic)
        .ok_or_else(|| ConnectorError::ConfigurationError(format!("topic '{topic}' not found")))?;

    if let Some(err) = entry.error() {
        return Err(ConnectorError::ConfigurationError(format!(
            "topic '{topic}' unavailable: {err:?}"
        )));
    }

    let partitions: Vec<i32> = entry.partitions().iter().map(|p| p.id()).collect();
    if partitions.is_empty() {
        return Err(ConnectorError::ConfigurationError(format!(
            "topic '{topic}' has no partitions"
        )));
    }
    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_source() -> KafkaTopicSource {
        KafkaTopicSource::new(KafkaReaderConfig::new("localhost:9092", "orders"))
    }

    #[test]
    fn test_new_is_closed() {
        let source = test_source();
        assert_eq!(source.topic(), "orders");
        assert!(source.partitions().is_empty());
        assert_eq!(source.committed().partition_count(), 0);
    }

    #[tokio::test]
    async fn test_poll_before_open() {
        let mut source = test_source();
        assert!(matches!(source.poll().await, Err(ConnectorError::Closed)));
        assert!(matches!(
            source.commit(&RecordPosition::new("orders", 0, 1)).await,
            Err(ConnectorError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_close_without_open() {
        let mut source = test_source();
        assert!(source.close().await.is_ok());
    }

    #[test]
    fn test_debug_output() {
        let debug = format!("{:?}", test_source());
        assert!(debug.contains("KafkaTopicSource"));
        assert!(debug.contains("orders"));
        assert!(debug.contains("topicbridge-orders"));
    }
}
