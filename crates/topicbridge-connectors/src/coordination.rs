//! Inter-stage coordination and the supervisor status protocol.
//!
//! - [`CommitDecision`]: writer → reader, one per forwarded record
//! - [`StageStatus`]: stage → supervisor, `Ready` once then at most one `Problem`
//! - [`StageState`]: `Starting → Running → Draining → Terminated`
//! - [`StatusReporter`]: enforces the status contract for one stage
//! - [`StageProbe`]: read-only view of a stage's state and metrics

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::StageError;
use crate::metrics::{StageMetrics, StageMetricsSnapshot};

/// The writer's verdict on one forwarded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitDecision {
    /// The destination write succeeded; advance the source offset.
    Commit,
    /// The write failed or the pipeline must stop; do not advance.
    NoCommit,
}

impl fmt::Display for CommitDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitDecision::Commit => write!(f, "Commit"),
            CommitDecision::NoCommit => write!(f, "NoCommit"),
        }
    }
}

/// Status a stage reports to its supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// The stage acquired its client and entered its main loop.
    Ready,
    /// The stage is terminating abnormally.
    Problem,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Ready => write!(f, "Ready"),
            StageStatus::Problem => write!(f, "Problem"),
        }
    }
}

/// Lifecycle state of a stage. Both stages share this shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageState {
    /// Acquiring the client.
    #[default]
    Starting,
    /// In the receive-process-decide loop.
    Running,
    /// Loop left; releasing the client.
    Draining,
    /// Final.
    Terminated,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageState::Starting => write!(f, "Starting"),
            StageState::Running => write!(f, "Running"),
            StageState::Draining => write!(f, "Draining"),
            StageState::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Read-only view of a stage, shareable with a supervisor.
#[derive(Debug, Clone, Default)]
pub struct StageProbe {
    state: Arc<RwLock<StageState>>,
    metrics: Arc<StageMetrics>,
}

impl StageProbe {
    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StageState {
        *self.state.read()
    }

    /// Returns the stage's counters.
    #[must_use]
    pub fn metrics(&self) -> &StageMetrics {
        &self.metrics
    }

    /// Returns a snapshot of the stage's counters.
    #[must_use]
    pub fn snapshot(&self) -> StageMetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Sends a stage's statuses and tracks its lifecycle.
///
/// `Ready` is sent at most once and only from [`StageState::Starting`].
/// `Problem` is sent at most once, only after `Ready`, only while the
/// stage is not cancelled and the supervisor still listens.
#[derive(Debug)]
pub struct StatusReporter {
    stage: String,
    status: mpsc::Sender<StageStatus>,
    probe: StageProbe,
    cancel: CancellationToken,
    ready_sent: bool,
    problem_sent: bool,
}

impl StatusReporter {
    /// Creates a reporter for `stage`, updating `probe` as the stage moves.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        status: mpsc::Sender<StageStatus>,
        probe: StageProbe,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stage: stage.into(),
            status,
            probe,
            cancel,
            ready_sent: false,
            problem_sent: false,
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StageState {
        self.probe.state()
    }

    /// Sends `Ready` and moves to [`StageState::Running`].
    ///
    /// # Errors
    ///
    /// Returns `StageError::Cancelled` if cancelled while sending, or
    /// `StageError::ChannelClosed` if the supervisor stopped listening.
    pub async fn ready(&mut self) -> Result<(), StageError> {
        if self.ready_sent || self.state() != StageState::Starting {
            return Ok(());
        }
        cancellable(&self.cancel, self.status.send(StageStatus::Ready))
            .await?
            .map_err(|_| StageError::ChannelClosed("status"))?;
        self.ready_sent = true;
        self.transition(StageState::Running);
        Ok(())
    }

    /// Moves to [`StageState::Draining`].
    pub fn draining(&mut self) {
        self.transition(StageState::Draining);
    }

    /// Reports the loop outcome and moves to [`StageState::Terminated`].
    ///
    /// Returns `true` if `Problem` was sent.
    pub async fn finish(&mut self, outcome: &Result<(), StageError>) -> bool {
        let reported = match outcome {
            Err(e) if !e.is_cancelled() => self.problem().await,
            _ => false,
        };
        self.transition(StageState::Terminated);
        reported
    }

    async fn problem(&mut self) -> bool {
        if !self.ready_sent
            || self.problem_sent
            || self.cancel.is_cancelled()
            || self.status.is_closed()
        {
            return false;
        }

        let sent = tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            res = self.status.send(StageStatus::Problem) => res.is_ok(),
        };
        if sent {
            self.problem_sent = true;
            error!(stage = %self.stage, "reported problem to supervisor");
        }
        sent
    }

    fn transition(&self, next: StageState) {
        let prev = std::mem::replace(&mut *self.probe.state.write(), next);
        if prev != next {
            info!(stage = %self.stage, from = %prev, to = %next, "stage state changed");
        }
    }
}

/// Runs `fut` unless `cancel` fires first.
///
/// # Errors
///
/// Returns `StageError::Cancelled` if the token was cancelled before
/// `fut` completed; `fut` is dropped in that case.
pub(crate) async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, StageError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!("cancellation observed");
            Err(StageError::Cancelled)
        }
        out = fut => Ok(out),
    }
}
