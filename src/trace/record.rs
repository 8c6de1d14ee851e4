/*!
 * Span Records
 * Immutable snapshots of finished spans handed to aggregation
 */

use crate::trace::identity::SpanIdentity;
use crate::trace::span::{AbortReason, Span, SpanStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One ancestor in a record's parent chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEntry {
    pub identity: SpanIdentity,
    pub name: String,
}

/// Everything aggregation needs from a finished span
///
/// Built once when the span terminates; the live tree can be dropped or
/// mutated afterwards without affecting queued records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub identity: SpanIdentity,
    pub name: String,
    pub status: SpanStatus,
    /// Wall-clock start in milliseconds since the epoch
    pub start_millis: u64,
    pub duration_nanos: u64,
    /// Duration minus direct children; negative when children overlap
    pub own_duration_nanos: i64,
    /// Root depth is 1
    pub depth: u32,
    /// Ancestors root-first, excluding the span itself
    pub lineage: Vec<LineageEntry>,
    pub context: Vec<serde_json::Value>,
    pub debug_lines: Vec<String>,
    pub abort: Option<AbortReason>,
    pub foreign: bool,
}

impl SpanRecord {
    /// Snapshot a finished span; `None` while it is still open or unstarted
    pub fn from_span(span: &Arc<Span>) -> Option<Arc<SpanRecord>> {
        let status = span.status();
        if !matches!(status, SpanStatus::Stopped | SpanStatus::Aborted) {
            return None;
        }
        let identity = span.identity()?;

        let mut lineage = Vec::new();
        let mut current = span.parent();
        while let Some(ancestor) = current {
            if let Some(ancestor_identity) = ancestor.identity() {
                lineage.push(LineageEntry {
                    identity: ancestor_identity,
                    name: ancestor.name().to_string(),
                });
            }
            current = ancestor.parent();
        }
        lineage.reverse();
        let depth = (lineage.len() + 1) as u32;

        Some(Arc::new(SpanRecord {
            identity,
            name: span.name().to_string(),
            status,
            start_millis: span.start_wall_millis().unwrap_or(0),
            duration_nanos: span.duration_nanos().unwrap_or(0),
            own_duration_nanos: span.own_duration_nanos().unwrap_or(0),
            depth,
            lineage,
            context: span.context().to_vec(),
            debug_lines: span.debug_lines(),
            abort: span.abort_reason(),
            foreign: span.is_foreign(),
        }))
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.status == SpanStatus::Aborted
    }
}
