//! Reader/writer pipeline wiring.
//!
//! [`BridgePipeline`] connects one [`TopicReader`] to one [`QueueWriter`]
//! with two rendezvous channels, spawns both as tokio tasks, and returns a
//! [`PipelineHandle`] through which a supervisor observes status, cancels
//! both stages together and joins them. Restarting on `Problem` is left to
//! the supervisor.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::coordination::{StageProbe, StageState, StageStatus};
use crate::error::StageError;
use crate::metrics::StageMetricsSnapshot;
use crate::queue::QueueClient;
use crate::reader::TopicReader;
use crate::rendezvous;
use crate::source::SourceClient;
use crate::transform::Transform;
use crate::writer::QueueWriter;

/// A stage sends at most `Ready` and `Problem`, so status sends never wait.
const STATUS_CAPACITY: usize = 2;

/// An unstarted reader/writer pair.
pub struct BridgePipeline<C: SourceClient, Q: QueueClient, T> {
    reader: TopicReader<C>,
    writer: QueueWriter<Q, T>,
    cancel: CancellationToken,
}

impl<C, Q, T> BridgePipeline<C, Q, T>
where
    C: SourceClient + 'static,
    Q: QueueClient + 'static,
    T: Transform<C::Value, Output = Q::Message> + 'static,
{
    /// Pairs `reader` with `writer`.
    #[must_use]
    pub fn new(reader: TopicReader<C>, writer: QueueWriter<Q, T>) -> Self {
        Self {
            reader,
            writer,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `cancel` to stop both stages. Replaces any token already set on them.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Spawns both stages on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(self) -> PipelineHandle {
        let reader = self.reader.with_cancellation(self.cancel.clone());
        let writer = self.writer.with_cancellation(self.cancel.clone());

        let (events_tx, events_rx) = rendezvous::channel();
        let (decision_tx, decision_rx) = rendezvous::channel();
        let (reader_status_tx, reader_status_rx) = mpsc::channel(STATUS_CAPACITY);
        let (writer_status_tx, writer_status_rx) = mpsc::channel(STATUS_CAPACITY);

        info!(
            reader = %reader.name(),
            writer = %writer.name(),
            topic = %reader.topic(),
            queue = %writer.queue_name(),
            "starting pipeline"
        );

        let reader_probe = reader.probe();
        let writer_probe = writer.probe();
        let reader_task = tokio::spawn(reader.run(events_tx, decision_rx, reader_status_tx));
        let writer_task = tokio::spawn(writer.run(events_rx, decision_tx, writer_status_tx));

        PipelineHandle {
            reader_status: reader_status_rx,
            writer_status: writer_status_rx,
            reader_probe,
            writer_probe,
            cancel: self.cancel,
            reader_task: Some(reader_task),
            writer_task: Some(writer_task),
        }
    }
}

impl<C: SourceClient, Q: QueueClient, T> std::fmt::Debug for BridgePipeline<C, Q, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgePipeline")
            .field("reader", &self.reader)
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

/// How each stage of a pipeline ended.
#[derive(Debug)]
pub struct PipelineExit {
    /// Reader outcome.
    pub reader: Result<(), StageError>,
    /// Writer outcome.
    pub writer: Result<(), StageError>,
}

impl PipelineExit {
    /// Returns `true` if both stages stopped without error.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.reader.is_ok() && self.writer.is_ok()
    }
}

/// Supervisor-side handle on a running pipeline.
#[derive(Debug)]
pub struct PipelineHandle {
    reader_status: mpsc::Receiver<StageStatus>,
    writer_status: mpsc::Receiver<StageStatus>,
    reader_probe: StageProbe,
    writer_probe: StageProbe,
    cancel: CancellationToken,
    reader_task: Option<JoinHandle<Result<(), StageError>>>,
    writer_task: Option<JoinHandle<Result<(), StageError>>>,
}

impl PipelineHandle {
    /// Status stream of the reader.
    pub fn reader_status(&mut self) -> &mut mpsc::Receiver<StageStatus> {
        &mut self.reader_status
    }

    /// Status stream of the writer.
    pub fn writer_status(&mut self) -> &mut mpsc::Receiver<StageStatus> {
        &mut self.writer_status
    }

    /// Returns the reader's lifecycle state.
    #[must_use]
    pub fn reader_state(&self) -> StageState {
        self.reader_probe.state()
    }

    /// Returns the writer's lifecycle state.
    #[must_use]
    pub fn writer_state(&self) -> StageState {
        self.writer_probe.state()
    }

    /// Returns the reader's counters.
    #[must_use]
    pub fn reader_metrics(&self) -> StageMetricsSnapshot {
        self.reader_probe.snapshot()
    }

    /// Returns the writer's counters.
    #[must_use]
    pub fn writer_metrics(&self) -> StageMetricsSnapshot {
        self.writer_probe.snapshot()
    }

    /// Returns the token shared by both stages.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels both stages. Neither reports `Problem`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once both stage tasks have finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        task_finished(self.reader_task.as_ref()) && task_finished(self.writer_task.as_ref())
    }

    /// Waits for both stage tasks to finish.
    ///
    /// A panicked task is reported as `StageError::Internal`. Later calls
    /// return `Ok(())` for both stages.
    pub async fn join(&mut self) -> PipelineExit {
        PipelineExit {
            reader: join_stage(self.reader_task.take()).await,
            writer: join_stage(self.writer_task.take()).await,
        }
    }

    /// Cancels both stages and waits for them.
    pub async fn shutdown(&mut self) -> PipelineExit {
        self.cancel();
        self.join().await
    }
}

fn task_finished(task: Option<&JoinHandle<Result<(), StageError>>>) -> bool {
    task.map_or(true, JoinHandle::is_finished)
}

async fn join_stage(task: Option<JoinHandle<Result<(), StageError>>>) -> Result<(), StageError> {
    match task {
        Some(handle) => handle
            .await
            .map_err(|e| StageError::Internal(format!("task panicked: {e}")))?,
        None => Ok(()),
    }
}
