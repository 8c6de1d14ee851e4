/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for span lifecycle operations
pub type SpanResult<T> = Result<T, SpanError>;

/// Result type for aggregation operations
pub type AggregationResult<T> = Result<T, AggregationError>;

/// Result type for snapshot persistence
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Span lifecycle errors with serialization support
///
/// These indicate instrumentation bugs (calls out of sequence) and are always
/// returned to the caller, never swallowed.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SpanError {
    #[error("Span name must not be empty")]
    #[diagnostic(
        code(span::empty_name),
        help("Provide a non-empty name describing the unit of work.")
    )]
    EmptyName,

    #[error("Span '{0}' is already started")]
    #[diagnostic(
        code(span::already_started),
        help("start() can only be called once per span. Create a new span instead.")
    )]
    AlreadyStarted(String),

    #[error("Span '{0}' is not started")]
    #[diagnostic(
        code(span::not_started),
        help("Call start() before stop() or abort().")
    )]
    NotStarted(String),

    #[error("Span '{0}' is already stopped")]
    #[diagnostic(
        code(span::already_stopped),
        help("stop() can only be called once per span.")
    )]
    AlreadyStopped(String),

    #[error("No current span on this thread")]
    #[diagnostic(
        code(span::no_current),
        help("stop_current() requires an open span on the calling thread's stack.")
    )]
    NoCurrentSpan,
}

/// Aggregation pipeline errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum AggregationError {
    #[error("Aggregation factory '{0}' is already registered")]
    #[diagnostic(
        code(aggregation::duplicate_factory),
        help("Factory names are unique per worker. Pick a different name.")
    )]
    DuplicateFactory(String),

    #[error("Aggregation worker is shut down")]
    #[diagnostic(
        code(aggregation::worker_closed),
        help("Register factories before shutting the worker down, or install a new worker.")
    )]
    WorkerClosed,
}

/// Snapshot persistence errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum PersistenceError {
    #[error("Snapshot I/O failed: {0}")]
    #[diagnostic(
        code(persistence::io),
        help("Check that the configured directory exists and is writable.")
    )]
    Io(String),

    #[error("Snapshot encoding failed: {0}")]
    #[diagnostic(
        code(persistence::codec),
        help("The snapshot file may be corrupt or written by an incompatible version.")
    )]
    Codec(String),
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::Io(err.to_string())
    }
}

impl From<crate::core::codec::CodecError> for PersistenceError {
    fn from(err: crate::core::codec::CodecError) -> Self {
        PersistenceError::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_error_display() {
        let err = SpanError::AlreadyStarted("fetch".to_string());
        assert_eq!(err.to_string(), "Span 'fetch' is already started");
    }

    #[test]
    fn test_error_serialization_round_trip() {
        let err = SpanError::NotStarted("work".to_string());
        let json = serde_json::to_string(&err).unwrap();
        let back: SpanError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }

    #[test]
    fn test_persistence_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PersistenceError = io.into();
        assert!(matches!(err, PersistenceError::Io(_)));
    }
}
