//! # `TopicBridge` Connectors
//!
//! Moves records from a single source topic to a destination queue, one
//! record at a time, committing the source offset only after the
//! destination write succeeded.
//!
//! ## Architecture
//!
//! ```text
//!            events (rendezvous)
//!   Reader ───────────────────────▶ Writer
//!     ▲                                │
//!     └────────────────────────────────┘
//!         commit decision (rendezvous)
//!
//!   Reader ──status──▶ supervisor ◀──status── Writer
//! ```
//!
//! - [`reader`] - Source-side stage (`TopicReader`)
//! - [`writer`] - Destination-side stage (`QueueWriter`)
//! - [`coordination`] - Commit decisions, stage status and lifecycle
//! - [`rendezvous`] - Zero-buffer handoff channel between stages
//! - [`pipeline`] - Wires a reader and a writer together for a supervisor
//! - [`testing`] - Mock clients and helpers

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::unreadable_literal, clippy::float_cmp))]

/// Error types for clients and stages.
pub mod error;

/// Client configuration types.
pub mod config;

/// Payload codecs selected by configuration.
pub mod codec;

/// Inter-stage coordination and supervisor status protocol.
pub mod coordination;

/// Zero-buffer handoff channel.
pub mod rendezvous;

/// Read-side client abstraction.
pub mod source;

/// Write-side client abstraction.
pub mod queue;

/// Pluggable record transformation.
pub mod transform;

/// Source-side stage.
pub mod reader;

/// Destination-side stage.
pub mod writer;

/// Per-stage metrics.
pub mod metrics;

/// Reader/writer pipeline wiring.
pub mod pipeline;

/// Testing utilities (mock clients, helpers).
pub mod testing;

/// Kafka read-side client.
#[cfg(feature = "kafka")]
pub mod kafka;

pub use coordination::{CommitDecision, StageState, StageStatus};
pub use error::{CodecError, ConnectorError, StageError};
pub use pipeline::{BridgePipeline, PipelineExit, PipelineHandle};
pub use reader::TopicReader;
pub use transform::{Transform, TransformResult};
pub use writer::QueueWriter;
