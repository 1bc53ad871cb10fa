//! Error types.
//!
//! - `ConnectorError`: failures of a read-side or write-side client
//! - `CodecError`: payload decoding failures
//! - `StageError`: the reason a stage loop stopped

use thiserror::Error;

/// Errors raised by read-side and write-side clients.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Failed to connect to the external system.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Required configuration key is missing.
    #[error("missing required config: {0}")]
    MissingConfig(String),

    /// Error reading from the source.
    #[error("read error: {0}")]
    ReadError(String),

    /// Error writing to the destination.
    #[error("write error: {0}")]
    WriteError(String),

    /// The source rejected an offset commit.
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// Payload decoding error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The client has been closed or was never opened.
    #[error("client closed")]
    Closed,

    /// An internal error that doesn't fit other categories.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors raised while decoding a source payload.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The codec name is not recognized.
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// A text payload was not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A fixed-width payload had the wrong length.
    #[error("invalid length for {codec}: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// The codec that rejected the payload.
        codec: &'static str,
        /// Expected payload length.
        expected: usize,
        /// Actual payload length.
        got: usize,
    },

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Json(e.to_string())
    }
}

/// Why a stage left its main loop.
///
/// Only [`StageError::Cancelled`] is a clean exit; every other variant
/// ends with a `Problem` status if the stage had reported `Ready`.
#[derive(Debug, Error)]
pub enum StageError {
    /// The stage observed its cancellation signal.
    #[error("stage cancelled")]
    Cancelled,

    /// The client could not be acquired.
    #[error("client acquisition failed: {0}")]
    Acquire(#[source] ConnectorError),

    /// Polling the source failed.
    #[error("source failure: {0}")]
    Source(#[source] ConnectorError),

    /// The source rejected the offset commit; its committed position is
    /// no longer known.
    #[error("source commit rejected: {0}")]
    CommitRejected(#[source] ConnectorError),

    /// Writing to the destination failed.
    #[error("destination failure: {0}")]
    Destination(#[source] ConnectorError),

    /// The transform rejected the record or panicked.
    #[error("transform failed: {0}")]
    TransformFailed(String),

    /// The writer answered `NoCommit`.
    #[error("downstream answered NoCommit")]
    NoCommit,

    /// A peer or the supervisor dropped its end of a channel.
    #[error("{0} channel closed")]
    ChannelClosed(&'static str),

    /// The stage task panicked or could not be joined.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StageError {
    /// Returns `true` if this exit was caused by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StageError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_error_display() {
        let err = ConnectorError::ConnectionFailed("host unreachable".into());
        assert_eq!(err.to_string(), "connection failed: host unreachable");
    }

    #[test]
    fn test_codec_error_from_json() {
        let json_err: Result<serde_json::Value, _> = serde_json::from_str("{bad json");
        let codec_err: CodecError = json_err.unwrap_err().into();
        assert!(matches!(codec_err, CodecError::Json(_)));
    }

    #[test]
    fn test_codec_error_into_connector_error() {
        let codec_err = CodecError::InvalidLength {
            codec: "long",
            expected: 8,
            got: 3,
        };
        let conn_err: ConnectorError = codec_err.into();
        assert!(matches!(conn_err, ConnectorError::Codec(_)));
        assert!(conn_err.to_string().contains("expected 8 bytes, got 3"));
    }

    #[test]
    fn test_stage_error_cancelled() {
        assert!(StageError::Cancelled.is_cancelled());
        assert!(!StageError::NoCommit.is_cancelled());
        assert!(!StageError::ChannelClosed("events").is_cancelled());
    }

    #[test]
    fn test_commit_rejected_keeps_source() {
        let err = StageError::CommitRejected(ConnectorError::CommitFailed(
            "rebalance in progress".into(),
        ));
        assert!(err.to_string().contains("rebalance in progress"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
