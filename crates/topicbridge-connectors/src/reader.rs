//! Source-side stage.
//!
//! [`TopicReader`] owns a [`SourceClient`] for its whole lifetime. It
//! forwards each polled value to the writer over a rendezvous channel and
//! blocks for the writer's [`CommitDecision`] before touching the next
//! record, so at most one record is ever in flight.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::coordination::{cancellable, CommitDecision, StageProbe, StageStatus, StatusReporter};
use crate::error::StageError;
use crate::rendezvous::{RendezvousReceiver, RendezvousSender};
use crate::source::SourceClient;

/// Reads one topic and hands its records to the writer, one at a time.
pub struct TopicReader<C: SourceClient> {
    name: String,
    client: C,
    cancel: CancellationToken,
    probe: StageProbe,
}

impl<C: SourceClient> TopicReader<C> {
    /// Creates a reader around an unopened client.
    #[must_use]
    pub fn new(client: C) -> Self {
        Self {
            name: "reader".to_string(),
            client,
            cancel: CancellationToken::new(),
            probe: StageProbe::default(),
        }
    }

    /// Sets the stage name used in logs.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replaces the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the topic the client reads.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.client.topic()
    }

    /// Returns a handle on this stage's state and metrics.
    #[must_use]
    pub fn probe(&self) -> StageProbe {
        self.probe.clone()
    }

    /// Returns the token that stops this stage.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the stage to completion.
    ///
    /// Sends `Ready` on `status` once the client is open, then forwards
    /// records until cancelled or until something fails. The client is
    /// closed on every exit path. `Problem` is sent on abnormal exit
    /// unless the stage was cancelled or `status` is closed.
    ///
    /// # Errors
    ///
    /// Returns the `StageError` that ended the loop. Cancellation is
    /// returned as `Ok(())`.
    pub async fn run(
        mut self,
        events: RendezvousSender<C::Value>,
        mut commit_decision: RendezvousReceiver<CommitDecision>,
        status: mpsc::Sender<StageStatus>,
    ) -> Result<(), StageError> {
        let mut reporter = StatusReporter::new(
            self.name.clone(),
            status,
            self.probe.clone(),
            self.cancel.clone(),
        );

        info!(stage = %self.name, topic = %self.client.topic(), "opening source client");
        let opened = cancellable(&self.cancel, self.client.open()).await;
        let outcome = match opened {
            Ok(Ok(())) => match reporter.ready().await {
                Ok(()) => self.pump(&events, &mut commit_decision).await,
                Err(e) => Err(e),
            },
            Ok(Err(e)) => {
                error!(stage = %self.name, error = %e, "failed to open source client");
                Err(StageError::Acquire(e))
            }
            Err(cancelled) => Err(cancelled),
        };

        reporter.draining();
        drop(events);
        commit_decision.close();
        if let Err(e) = self.client.close().await {
            warn!(stage = %self.name, error = %e, "failed to close source client");
        }

        match &outcome {
            Ok(()) | Err(StageError::Cancelled) => {
                info!(stage = %self.name, "reader stopped");
            }
            Err(e) => {
                self.probe.metrics().record_error();
                error!(stage = %self.name, error = %e, "reader failed");
            }
        }
        reporter.finish(&outcome).await;

        match outcome {
            Err(StageError::Cancelled) => Ok(()),
            other => other,
        }
    }

    async fn pump(
        &mut self,
        events: &RendezvousSender<C::Value>,
        commit_decision: &mut RendezvousReceiver<CommitDecision>,
    ) -> Result<(), StageError> {
        loop {
            let polled = cancellable(&self.cancel, self.client.poll())
                .await?
                .map_err(StageError::Source)?;
            let Some(record) = polled else {
                continue;
            };

            let metrics = self.probe.metrics();
            metrics.record_received();
            let position = record.position;
            debug!(stage = %self.name, position = %position, "forwarding record");

            cancellable(&self.cancel, events.send(record.value))
                .await?
                .map_err(|_| StageError::ChannelClosed("events"))?;
            metrics.record_delivered();

            let decision = cancellable(&self.cancel, commit_decision.recv())
                .await?
                .ok_or(StageError::ChannelClosed("commit decision"))?;

            match decision {
                CommitDecision::Commit => {
                    self.client
                        .commit(&position)
                        .await
                        .map_err(StageError::CommitRejected)?;
                    metrics.record_commit();
                    debug!(stage = %self.name, position = %position, "committed offset");
                }
                CommitDecision::NoCommit => {
                    metrics.record_no_commit();
                    warn!(stage = %self.name, position = %position, "writer refused record");
                    return Err(StageError::NoCommit);
                }
            }
        }
    }
}

impl<C: SourceClient> std::fmt::Debug for TopicReader<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicReader")
            .field("name", &self.name)
            .field("topic", &self.client.topic())
            .field("state", &self.probe.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::StageState;
    use crate::rendezvous;
    use crate::testing::{collect_statuses, wait_until, MockSource};

    #[tokio::test]
    async fn test_commits_after_commit_decision() {
        let source = MockSource::with_values("events", &["A", "B"]);
        let log = source.log();
        let reader = TopicReader::new(source);
        let cancel = reader.cancellation_token();
        let probe = reader.probe();

        let (events_tx, mut events_rx) = rendezvous::channel();
        let (decision_tx, decision_rx) = rendezvous::channel();
        let (status_tx, mut status_rx) = mpsc::channel(2);
        let task = tokio::spawn(reader.run(events_tx, decision_rx, status_tx));

        assert_eq!(events_rx.recv().await.as_deref(), Some("A"));
        assert!(log.committed().is_empty());
        decision_tx.send(CommitDecision::Commit).await.unwrap();

        assert_eq!(events_rx.recv().await.as_deref(), Some("B"));
        assert_eq!(log.committed_offsets(), vec![0]);
        decision_tx.send(CommitDecision::Commit).await.unwrap();

        wait_until("commit for B", || probe.snapshot().commits == 2).await;
        cancel.cancel();
        assert!(task.await.unwrap().is_ok());

        assert_eq!(log.committed_offsets(), vec![0, 1]);
        assert!(log.was_closed());
        assert_eq!(probe.state(), StageState::Terminated);
        assert_eq!(probe.snapshot().commits, 2);
        assert_eq!(collect_statuses(&mut status_rx).await, vec![StageStatus::Ready]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_poll_waits_for_decision() {
        let source = MockSource::with_values("events", &["A", "B"]);
        let log = source.log();
        let reader = TopicReader::new(source);
        let cancel = reader.cancellation_token();

        let (events_tx, mut events_rx) = rendezvous::channel();
        let (decision_tx, decision_rx) = rendezvous::channel();
        let (status_tx, _status_rx) = mpsc::channel(2);
        let task = tokio::spawn(reader.run(events_tx, decision_rx, status_tx));

        assert_eq!(events_rx.recv().await.as_deref(), Some("A"));
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert_eq!(log.polled_offsets(), vec![0]);
        assert_eq!(log.poll_count(), 1);

        decision_tx.send(CommitDecision::Commit).await.unwrap();
        assert_eq!(events_rx.recv().await.as_deref(), Some("B"));
        assert_eq!(log.polled_offsets(), vec![0, 1]);

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_no_commit_stops_reader() {
        let source = MockSource::with_values("events", &["A", "B"]);
        let log = source.log();
        let reader = TopicReader::new(source);

        let (events_tx, mut events_rx) = rendezvous::channel();
        let (decision_tx, decision_rx) = rendezvous::channel();
        let (status_tx, mut status_rx) = mpsc::channel(2);
        let task = tokio::spawn(reader.run(events_tx, decision_rx, status_tx));

        assert_eq!(events_rx.recv().await.as_deref(), Some("A"));
        decision_tx.send(CommitDecision::NoCommit).await.unwrap();

        assert!(matches!(task.await.unwrap(), Err(StageError::NoCommit)));
        assert!(log.committed().is_empty());
        assert_eq!(log.polled_offsets(), vec![0]);
        assert!(log.was_closed());
        assert_eq!(
            collect_statuses(&mut status_rx).await,
            vec![StageStatus::Ready, StageStatus::Problem]
        );
    }

    #[tokio::test]
    async fn test_commit_rejection_is_problem() {
        let source = MockSource::with_values("events", &["A", "B"]).failing_commit_at(0);
        let log = source.log();
        let reader = TopicReader::new(source);

        let (events_tx, mut events_rx) = rendezvous::channel();
        let (decision_tx, decision_rx) = rendezvous::channel();
        let (status_tx, mut status_rx) = mpsc::channel(2);
        let task = tokio::spawn(reader.run(events_tx, decision_rx, status_tx));

        assert_eq!(events_rx.recv().await.as_deref(), Some("A"));
        decision_tx.send(CommitDecision::Commit).await.unwrap();

        assert!(matches!(
            task.await.unwrap(),
            Err(StageError::CommitRejected(_))
        ));
        // the reader dropped its sender without forwarding B
        assert_eq!(events_rx.recv().await, None);
        assert_eq!(log.polled_offsets(), vec![0]);
        assert_eq!(
            collect_statuses(&mut status_rx).await,
            vec![StageStatus::Ready, StageStatus::Problem]
        );
    }

    #[tokio::test]
    async fn test_poll_failure_is_problem() {
        let source = MockSource::with_values("events", &["A"]).failing_poll_at(0);
        let reader = TopicReader::new(source);

        let (events_tx, _events_rx) = rendezvous::channel::<String>();
        let (_decision_tx, decision_rx) = rendezvous::channel();
        let (status_tx, mut status_rx) = mpsc::channel(2);

        let res = reader.run(events_tx, decision_rx, status_tx).await;
        assert!(matches!(res, Err(StageError::Source(_))));
        assert_eq!(
            collect_statuses(&mut status_rx).await,
            vec![StageStatus::Ready, StageStatus::Problem]
        );
    }

    #[tokio::test]
    async fn test_acquire_failure_reports_nothing() {
        let source = MockSource::with_values("events", &["A"]).failing_open();
        let log = source.log();
        let reader = TopicReader::new(source);
        let probe = reader.probe();

        let (events_tx, _events_rx) = rendezvous::channel::<String>();
        let (_decision_tx, decision_rx) = rendezvous::channel();
        let (status_tx, mut status_rx) = mpsc::channel(2);

        let res = reader.run(events_tx, decision_rx, status_tx).await;
        assert!(matches!(res, Err(StageError::Acquire(_))));
        assert!(collect_statuses(&mut status_rx).await.is_empty());
        assert_eq!(log.poll_count(), 0);
        assert_eq!(probe.state(), StageState::Terminated);
    }

    #[tokio::test]
    async fn test_writer_gone_is_problem() {
        let source = MockSource::with_values("events", &["A"]);
        let reader = TopicReader::new(source);

        let (events_tx, events_rx) = rendezvous::channel::<String>();
        let (_decision_tx, decision_rx) = rendezvous::channel();
        let (status_tx, mut status_rx) = mpsc::channel(2);
        drop(events_rx);

        let res = reader.run(events_tx, decision_rx, status_tx).await;
        assert!(matches!(res, Err(StageError::ChannelClosed("events"))));
        assert_eq!(
            collect_statuses(&mut status_rx).await,
            vec![StageStatus::Ready, StageStatus::Problem]
        );
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_decision() {
        let source = MockSource::with_values("events", &["A"]);
        let log = source.log();
        let reader = TopicReader::new(source);
        let cancel = reader.cancellation_token();

        let (events_tx, mut events_rx) = rendezvous::channel();
        let (_decision_tx, decision_rx) = rendezvous::channel();
        let (status_tx, mut status_rx) = mpsc::channel(2);
        let task = tokio::spawn(reader.run(events_tx, decision_rx, status_tx));

        assert_eq!(events_rx.recv().await.as_deref(), Some("A"));
        cancel.cancel();

        assert!(task.await.unwrap().is_ok());
        assert!(log.committed().is_empty());
        assert!(log.was_closed());
        assert_eq!(collect_statuses(&mut status_rx).await, vec![StageStatus::Ready]);
    }
}
