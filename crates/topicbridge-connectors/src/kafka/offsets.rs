//! Committed-offset bookkeeping for the Kafka reader.
//!
//! Offsets recorded here are the last *committed record* per partition.
//! The list handed to Kafka carries offset+1 (the next offset to fetch),
//! per Kafka convention.

use std::collections::HashMap;

use rdkafka::{Offset, TopicPartitionList};

use crate::error::ConnectorError;
use crate::source::RecordPosition;

/// Builds the commit list for a single record.
///
/// # Errors
///
/// Returns `ConnectorError::CommitFailed` if the partition cannot be added.
pub fn commit_list(position: &RecordPosition) -> Result<TopicPartitionList, ConnectorError> {
    let mut tpl = TopicPartitionList::with_capacity(1);
    tpl.add_partition_offset(
        &position.topic,
        position.partition,
        Offset::Offset(position.next_offset()),
    )
    .map_err(|e| ConnectorError::CommitFailed(format!("invalid commit position {position}: {e}")))?;
    Ok(tpl)
}

/// Builds an assignment of `partitions` of `topic`, each resuming from the
/// stored offset.
///
/// # Errors
///
/// Returns `ConnectorError::ConfigurationError` if a partition's starting
/// offset cannot be set.
pub fn assignment_list(
    topic: &str,
    partitions: &[i32],
) -> Result<TopicPartitionList, ConnectorError> {
    let mut tpl = TopicPartitionList::with_capacity(partitions.len());
    for &partition in partitions {
        tpl.add_partition(topic, partition)
            .set_offset(Offset::Stored)
            .map_err(|e| {
                ConnectorError::ConfigurationError(format!(
                    "cannot assign {topic}-{partition} from stored offset: {e}"
                ))
            })?;
    }
    Ok(tpl)
}

/// Last committed record offset per partition of one topic.
#[derive(Debug, Clone, Default)]
pub struct CommittedOffsets {
    offsets: HashMap<i32, i64>,
}

impl CommittedOffsets {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `position` was committed.
    pub fn record(&mut self, position: &RecordPosition) {
        self.offsets.insert(position.partition, position.offset);
    }

    /// Last committed record offset for `partition`.
    #[must_use]
    pub fn get(&self, partition: i32) -> Option<i64> {
        self.offsets.get(&partition).copied()
    }

    /// Number of partitions with at least one commit.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.offsets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_list_uses_next_offset() {
        let tpl = commit_list(&RecordPosition::new("orders", 2, 41)).unwrap();
        assert_eq!(tpl.count(), 1);
        let elem = tpl.find_partition("orders", 2).unwrap();
        assert_eq!(elem.offset(), Offset::Offset(42));
    }

    #[test]
    fn test_assignment_list_is_stored() {
        let tpl = assignment_list("orders", &[0, 1, 2]).unwrap();
        assert_eq!(tpl.count(), 3);
        for p in 0..3 {
            assert_eq!(tpl.find_partition("orders", p).unwrap().offset(), Offset::Stored);
        }
    }

    #[test]
    fn test_assignment_list_empty() {
        let tpl = assignment_list("orders", &[]).unwrap();
        assert_eq!(tpl.count(), 0);
    }

    #[test]
    fn test_committed_offsets() {
        let mut committed = CommittedOffsets::new();
        committed.record(&RecordPosition::new("orders", 0, 5));
        committed.record(&RecordPosition::new("orders", 0, 6));
        committed.record(&RecordPosition::new("orders", 1, 2));

        assert_eq!(committed.get(0), Some(6));
        assert_eq!(committed.get(1), Some(2));
        assert_eq!(committed.get(3), None);
        assert_eq!(committed.partition_count(), 2);
    }
}
