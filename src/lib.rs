/*!
 * Tracery
 * In-process span tracing and metrics aggregation
 */

pub mod aggregation;
pub mod core;
pub mod registry;
pub mod telemetry;
pub mod trace;

// Re-exports
pub use aggregation::{
    AggregateStats, AggregationFactory, AggregationKey, AggregationNode, AggregationWorker,
    DrainStrategy, KeyStrategy, PersistenceConfig, StatsKind,
};
pub use core::errors::{
    AggregationError, AggregationResult, PersistenceError, PersistenceResult, SpanError,
    SpanResult,
};
pub use core::{global_capture_level, set_capture_level, CaptureLevel};
pub use trace::{
    abort_open_span_on_panic, start, start_with_context, stop_current, AbortReason, CallSite,
    ScopedSpan, Span, SpanIdentity, SpanRecord, SpanSnapshot, SpanStatus, TraceContext,
};
