//! Testing utilities for stage and pipeline tests.
//!
//! Provides a scripted [`MockSource`], an in-memory [`MockQueue`], and a
//! shared [`Journal`] both can append to so tests can assert the exact
//! interleaving of polls, writes and commits.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::coordination::StageStatus;
use crate::error::ConnectorError;
use crate::queue::{QueueClient, TextMessage};
use crate::source::{RecordPosition, SourceClient, SourceRecord};
use crate::transform::TransformResult;

/// Ordered log of client calls shared between mocks.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Returns a copy of all entries.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }
}

/// Observable side of a [`MockSource`], kept after the source moves into a stage.
#[derive(Debug, Default)]
pub struct SourceLog {
    polled: Mutex<Vec<RecordPosition>>,
    committed: Mutex<Vec<RecordPosition>>,
    opens: AtomicU64,
    polls: AtomicU64,
    is_open: AtomicBool,
    was_closed: AtomicBool,
}

impl SourceLog {
    /// Positions handed out by `poll`, in order.
    #[must_use]
    pub fn polled(&self) -> Vec<RecordPosition> {
        self.polled.lock().clone()
    }

    /// Offsets handed out by `poll`, in order.
    #[must_use]
    pub fn polled_offsets(&self) -> Vec<i64> {
        self.polled.lock().iter().map(|p| p.offset).collect()
    }

    /// Positions successfully committed, in order.
    #[must_use]
    pub fn committed(&self) -> Vec<RecordPosition> {
        self.committed.lock().clone()
    }

    /// Offsets successfully committed, in order.
    #[must_use]
    pub fn committed_offsets(&self) -> Vec<i64> {
        self.committed.lock().iter().map(|p| p.offset).collect()
    }

    /// Number of `open` calls, counted as soon as each call starts.
    #[must_use]
    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    /// Number of `poll` calls, including empty ones.
    #[must_use]
    pub fn poll_count(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }

    /// Whether the source is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Relaxed)
    }

    /// Whether `close` was called.
    #[must_use]
    pub fn was_closed(&self) -> bool {
        self.was_closed.load(Ordering::Relaxed)
    }
}

/// Scripted read-side client.
///
/// Hands out its records one per poll, then idles for `idle_wait` on each
/// poll, returning nothing.
#[derive(Debug)]
pub struct MockSource {
    topic: String,
    pending: VecDeque<SourceRecord<String, String>>,
    idle_wait: Duration,
    open_delay: Duration,
    fail_open: bool,
    fail_poll_at: Option<i64>,
    fail_commit_at: Option<i64>,
    log: Arc<SourceLog>,
    journal: Option<Journal>,
}

impl MockSource {
    /// Creates an empty source for `topic`.
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            pending: VecDeque::new(),
            idle_wait: Duration::from_millis(10),
            open_delay: Duration::ZERO,
            fail_open: false,
            fail_poll_at: None,
            fail_commit_at: None,
            log: Arc::new(SourceLog::default()),
            journal: None,
        }
    }

    /// Creates a source whose partition 0 holds `values` at offsets `0..n`.
    #[must_use]
    pub fn with_values(topic: impl Into<String>, values: &[&str]) -> Self {
        let mut source = Self::new(topic);
        for (offset, value) in (0_i64..).zip(values) {
            let position = RecordPosition::new(source.topic.clone(), 0, offset);
            source
                .pending
                .push_back(SourceRecord::new(position, (*value).to_string()));
        }
        source
    }

    /// Delays `open` by `delay`.
    #[must_use]
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Makes `open` fail.
    #[must_use]
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Makes `poll` fail instead of returning the record at `offset`.
    #[must_use]
    pub fn failing_poll_at(mut self, offset: i64) -> Self {
        self.fail_poll_at = Some(offset);
        self
    }

    /// Makes `commit` reject the record at `offset`.
    #[must_use]
    pub fn failing_commit_at(mut self, offset: i64) -> Self {
        self.fail_commit_at = Some(offset);
        self
    }

    /// Appends `poll <pos>` and `commit <pos>` entries to `journal`.
    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Returns the shared log.
    #[must_use]
    pub fn log(&self) -> Arc<SourceLog> {
        Arc::clone(&self.log)
    }

    fn note(&self, entry: String) {
        if let Some(journal) = &self.journal {
            journal.push(entry);
        }
    }
}

#[async_trait]
impl SourceClient for MockSource {
    type Key = String;
    type Value = String;

    async fn open(&mut self) -> Result<(), ConnectorError> {
        self.log.opens.fetch_add(1, Ordering::Relaxed);
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if self.fail_open {
            return Err(ConnectorError::ConnectionFailed(
                "mock source unavailable".into(),
            ));
        }
        self.log.is_open.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn poll(&mut self) -> Result<Option<SourceRecord<String, String>>, ConnectorError> {
        if !self.log.is_open() {
            return Err(ConnectorError::Closed);
        }
        self.log.polls.fetch_add(1, Ordering::Relaxed);

        let Some(front) = self.pending.front() else {
            tokio::time::sleep(self.idle_wait).await;
            return Ok(None);
        };
        if self.fail_poll_at == Some(front.position.offset) {
            return Err(ConnectorError::ReadError(format!(
                "mock read failure at {}",
                front.position
            )));
        }

        let record = self.pending.pop_front();
        if let Some(record) = &record {
            self.log.polled.lock().push(record.position.clone());
            self.note(format!("poll {}", record.position));
        }
        Ok(record)
    }

    async fn commit(&mut self, position: &RecordPosition) -> Result<(), ConnectorError> {
        if self.fail_commit_at == Some(position.offset) {
            return Err(ConnectorError::CommitFailed(format!(
                "mock commit rejected at {position}"
            )));
        }
        self.log.committed.lock().push(position.clone());
        self.note(format!("commit {position}"));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        self.log.is_open.store(false, Ordering::Relaxed);
        self.log.was_closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}

/// Observable side of a [`MockQueue`].
#[derive(Debug, Default)]
pub struct QueueLog {
    written: Mutex<Vec<TextMessage>>,
    attempts: AtomicU64,
    is_open: AtomicBool,
    was_closed: AtomicBool,
}

impl QueueLog {
    /// Messages accepted, in order.
    #[must_use]
    pub fn written(&self) -> Vec<TextMessage> {
        self.written.lock().clone()
    }

    /// Bodies of the messages accepted, in order.
    #[must_use]
    pub fn written_texts(&self) -> Vec<String> {
        self.written.lock().iter().map(|m| m.text.clone()).collect()
    }

    /// Number of `send` calls, including failed ones.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Whether the queue is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Relaxed)
    }

    /// Whether `close` was called.
    #[must_use]
    pub fn was_closed(&self) -> bool {
        self.was_closed.load(Ordering::Relaxed)
    }
}

/// In-memory write-side client.
#[derive(Debug)]
pub struct MockQueue {
    queue_name: String,
    fail_open: bool,
    fail_on_text: Option<String>,
    send_delay: Duration,
    log: Arc<QueueLog>,
    journal: Option<Journal>,
}

impl MockQueue {
    /// Creates a queue named `queue_name`.
    #[must_use]
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            fail_open: false,
            fail_on_text: None,
            send_delay: Duration::ZERO,
            log: Arc::new(QueueLog::default()),
            journal: None,
        }
    }

    /// Makes `open` fail.
    #[must_use]
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Makes `send` fail for any message whose body equals `text`.
    #[must_use]
    pub fn failing_on(mut self, text: impl Into<String>) -> Self {
        self.fail_on_text = Some(text.into());
        self
    }

    /// Delays every `send` by `delay`.
    #[must_use]
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Appends `write <text>` entries to `journal`.
    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Returns the shared log.
    #[must_use]
    pub fn log(&self) -> Arc<QueueLog> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl QueueClient for MockQueue {
    type Message = TextMessage;

    async fn open(&mut self) -> Result<(), ConnectorError> {
        if self.fail_open {
            return Err(ConnectorError::ConnectionFailed(
                "mock queue manager unavailable".into(),
            ));
        }
        self.log.is_open.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn send(&mut self, message: TextMessage) -> Result<(), ConnectorError> {
        if !self.log.is_open() {
            return Err(ConnectorError::Closed);
        }
        self.log.attempts.fetch_add(1, Ordering::Relaxed);
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        if self.fail_on_text.as_deref() == Some(message.text.as_str()) {
            return Err(ConnectorError::WriteError(format!(
                "mock write rejected: {}",
                message.text
            )));
        }
        if let Some(journal) = &self.journal {
            journal.push(format!("write {}", message.text));
        }
        self.log.written.lock().push(message);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        self.log.is_open.store(false, Ordering::Relaxed);
        self.log.was_closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

/// Wraps every event in a [`TextMessage`].
#[must_use]
#[allow(clippy::needless_pass_by_value)]
pub fn text_message(event: String) -> TransformResult<TextMessage> {
    TransformResult::Success(TextMessage::new(event))
}

/// Wraps every event except `reject` in a [`TextMessage`].
#[must_use]
pub fn rejecting(reject: &'static str) -> impl Fn(String) -> TransformResult<TextMessage> + Send + Sync {
    move |event: String| {
        if event == reject {
            TransformResult::Failure(format!("cannot map event {event}"))
        } else {
            TransformResult::Success(TextMessage::new(event))
        }
    }
}

/// Receives every status until the stage drops its sender.
pub async fn collect_statuses(rx: &mut mpsc::Receiver<StageStatus>) -> Vec<StageStatus> {
    let mut out = Vec::new();
    while let Some(status) = rx.recv().await {
        out.push(status);
    }
    out
}

/// Polls `cond` every few milliseconds until it holds.
///
/// # Panics
///
/// Panics if `cond` does not hold within five seconds.
pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_source_hands_out_one_per_poll() {
        let mut source = MockSource::with_values("events", &["A", "B"]);
        let log = source.log();
        source.open().await.unwrap();
        assert_eq!(log.open_count(), 1);

        let first = source.poll().await.unwrap().unwrap();
        assert_eq!(first.value, "A");
        assert_eq!(log.polled_offsets(), vec![0]);

        let second = source.poll().await.unwrap().unwrap();
        assert_eq!(second.position.offset, 1);

        assert!(source.poll().await.unwrap().is_none());
        assert_eq!(log.polled_offsets(), vec![0, 1]);
        assert_eq!(log.poll_count(), 3);

        source.close().await.unwrap();
        assert!(log.was_closed());
        assert!(!log.is_open());
    }

    #[tokio::test]
    async fn test_mock_source_failures() {
        let mut source = MockSource::with_values("events", &["A", "B"])
            .failing_poll_at(1)
            .failing_commit_at(0);
        source.open().await.unwrap();

        let record = source.poll().await.unwrap().unwrap();
        assert!(matches!(
            source.commit(&record.position).await,
            Err(ConnectorError::CommitFailed(_))
        ));
        assert!(matches!(
            source.poll().await,
            Err(ConnectorError::ReadError(_))
        ));
        assert!(source.log().committed().is_empty());
        assert_eq!(source.log().polled_offsets(), vec![0]);
    }

    #[tokio::test]
    async fn test_mock_source_failing_open() {
        let mut source = MockSource::new("events").failing_open();
        assert!(source.open().await.is_err());
        assert!(matches!(source.poll().await, Err(ConnectorError::Closed)));
    }

    #[tokio::test]
    async fn test_mock_queue() {
        let journal = Journal::new();
        let mut queue = MockQueue::new("OUT.Q")
            .failing_on("B")
            .with_journal(journal.clone());
        let log = queue.log();
        queue.open().await.unwrap();

        queue.send(TextMessage::new("A")).await.unwrap();
        assert!(matches!(
            queue.send(TextMessage::new("B")).await,
            Err(ConnectorError::WriteError(_))
        ));

        assert_eq!(log.written_texts(), vec!["A".to_string()]);
        assert_eq!(log.attempts(), 2);
        assert_eq!(journal.entries(), vec!["write A".to_string()]);
        assert_eq!(queue.queue_name(), "OUT.Q");
    }

    #[test]
    fn test_rejecting_transform() {
        let t = rejecting("C");
        assert!(t("A".into()).is_success());
        assert!(!t("C".into()).is_success());
    }
}
