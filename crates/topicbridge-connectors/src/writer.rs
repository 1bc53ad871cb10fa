//! Destination-side stage.
//!
//! [`QueueWriter`] takes each event from the reader, transforms it, writes
//! it to the destination queue and only then answers `Commit`. A failed
//! transform or write is answered with `NoCommit` and ends the stage.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::coordination::{cancellable, CommitDecision, StageProbe, StageStatus, StatusReporter};
use crate::error::StageError;
use crate::queue::QueueClient;
use crate::rendezvous::{RendezvousReceiver, RendezvousSender};
use crate::transform::{apply_guarded, Transform, TransformResult};

/// Writes transformed events to a queue and decides whether the reader may commit.
pub struct QueueWriter<Q: QueueClient, T> {
    name: String,
    client: Q,
    transform: T,
    cancel: CancellationToken,
    probe: StageProbe,
}

impl<Q: QueueClient, T> QueueWriter<Q, T> {
    /// Creates a writer around an unopened client.
    #[must_use]
    pub fn new(client: Q, transform: T) -> Self {
        Self {
            name: "writer".to_string(),
            client,
            transform,
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

    /// Returns the destination queue name.
    #[must_use]
    pub fn queue_name(&self) -> &str {
        self.client.queue_name()
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
    /// # Errors
    ///
    /// Returns the `StageError` that ended the loop. Cancellation is
    /// returned as `Ok(())`.
    pub async fn run<V>(
        mut self,
        mut from_upstream: RendezvousReceiver<V>,
        to_upstream: RendezvousSender<CommitDecision>,
        to_supervisor: mpsc::Sender<StageStatus>,
    ) -> Result<(), StageError>
    where
        V: Send,
        T: Transform<V, Output = Q::Message>,
    {
        let mut reporter = StatusReporter::new(
            self.name.clone(),
            to_supervisor,
            self.probe.clone(),
            self.cancel.clone(),
        );

        info!(stage = %self.name, queue = %self.client.queue_name(), "opening queue client");
        let opened = cancellable(&self.cancel, self.client.open()).await;
        let outcome = match opened {
            Ok(Ok(())) => match reporter.ready().await {
                Ok(()) => self.pump(&mut from_upstream, &to_upstream).await,
                Err(e) => Err(e),
            },
            Ok(Err(e)) => {
                error!(stage = %self.name, error = %e, "failed to open queue client");
                Err(StageError::Acquire(e))
            }
            Err(cancelled) => Err(cancelled),
        };

        reporter.draining();
        from_upstream.close();
        drop(to_upstream);
        if let Err(e) = self.client.close().await {
            warn!(stage = %self.name, error = %e, "failed to close queue client");
        }

        match &outcome {
            Ok(()) | Err(StageError::Cancelled) => {
                info!(stage = %self.name, "writer stopped");
            }
            Err(e) => {
                self.probe.metrics().record_error();
                error!(stage = %self.name, error = %e, "writer failed");
            }
        }
        reporter.finish(&outcome).await;

        match outcome {
            Err(StageError::Cancelled) => Ok(()),
            other => other,
        }
    }

    async fn pump<V>(
        &mut self,
        from_upstream: &mut RendezvousReceiver<V>,
        to_upstream: &RendezvousSender<CommitDecision>,
    ) -> Result<(), StageError>
    where
        V: Send,
        T: Transform<V, Output = Q::Message>,
    {
        loop {
            let event = cancellable(&self.cancel, from_upstream.recv())
                .await?
                .ok_or(StageError::ChannelClosed("events"))?;
            self.probe.metrics().record_received();

            let transformed = apply_guarded(&self.transform, event);
            let written = match transformed {
                TransformResult::Success(message) => {
                    cancellable(&self.cancel, self.client.send(message))
                        .await?
                        .map_err(StageError::Destination)
                }
                TransformResult::Failure(reason) => Err(StageError::TransformFailed(reason)),
            };

            if let Err(e) = written {
                self.refuse(to_upstream).await?;
                return Err(e);
            }

            self.probe.metrics().record_delivered();
            cancellable(&self.cancel, to_upstream.send(CommitDecision::Commit))
                .await?
                .map_err(|_| StageError::ChannelClosed("commit decision"))?;
            self.probe.metrics().record_commit();
            debug!(stage = %self.name, "record written, commit sent");
        }
    }

    /// Tells the reader not to commit. A reader that already left is not an error.
    async fn refuse(&mut self, to_upstream: &RendezvousSender<CommitDecision>) -> Result<(), StageError> {
        match cancellable(&self.cancel, to_upstream.send(CommitDecision::NoCommit)).await? {
            Ok(()) => self.probe.metrics().record_no_commit(),
            Err(_) => debug!(stage = %self.name, "reader gone, NoCommit not delivered"),
        }
        Ok(())
    }
}

impl<Q: QueueClient, T> std::fmt::Debug for QueueWriter<Q, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueWriter")
            .field("name", &self.name)
            .field("queue", &self.client.queue_name())
            .field("state", &self.probe.state())
            .finish_non_exhaustive()
    }
}
