/*!
 * Span Snapshots
 * Serializable point-in-time copies of span subtrees for cross-boundary stitching
 */

use crate::trace::callsite::{self, CallSite, CallSitePair};
use crate::trace::identity::SpanIdentity;
use crate::trace::span::{AbortReason, Span, SpanStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// A detached copy of a span subtree
///
/// Captures freeze the tree: a snapshot of a still-running span carries its
/// elapsed duration, and spans rebuilt from a snapshot are terminal. The
/// `status` field reports the state observed at capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanSnapshot {
    pub name: String,
    pub identity: Option<SpanIdentity>,
    pub status: SpanStatus,
    pub start_millis: Option<u64>,
    pub duration_nanos: Option<u64>,
    pub abort: Option<AbortReason>,
    pub context: Vec<serde_json::Value>,
    pub debug_lines: Vec<String>,
    pub start_site: Option<CallSite>,
    pub stop_site: Option<CallSite>,
    pub foreign: bool,
    pub children: Vec<SpanSnapshot>,
}

impl SpanSnapshot {
    /// Capture a span and its subtree
    pub fn capture(span: &Arc<Span>) -> Self {
        Self {
            name: span.name().to_string(),
            identity: span.identity(),
            status: span.status(),
            start_millis: span.start_wall_millis(),
            duration_nanos: span.duration_nanos(),
            abort: span.abort_reason(),
            context: span.context().to_vec(),
            debug_lines: span.debug_lines(),
            start_site: span.start_site(),
            stop_site: span.stop_site(),
            foreign: span.is_foreign(),
            children: span.children().iter().map(Self::capture).collect(),
        }
    }

    /// Rebuild the subtree as foreign, terminal spans
    ///
    /// Identities are taken verbatim; call sites carried by the snapshot are
    /// registered in the call-site cache unless that identity is already
    /// known locally.
    pub(crate) fn materialize(&self) -> Arc<Span> {
        let span = Span::from_parts(
            self.name.clone(),
            self.context.clone(),
            self.debug_lines.clone(),
            self.identity,
            self.start_millis,
            self.duration_nanos.map(Duration::from_nanos),
            self.abort.clone(),
            true,
        );
        if let (Some(identity), Some(start)) = (&self.identity, &self.start_site) {
            callsite::record_pair(
                identity,
                CallSitePair {
                    start: start.clone(),
                    stop: self.stop_site.clone(),
                },
            );
        }
        for child_snapshot in &self.children {
            let child = child_snapshot.materialize();
            Span::link_child(&span, &child);
        }
        span
    }
}

impl Span {
    /// Capture this span and its subtree as a portable snapshot
    #[inline]
    pub fn to_snapshot(self: &Arc<Self>) -> SpanSnapshot {
        SpanSnapshot::capture(self)
    }
}
