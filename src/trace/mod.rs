/*!
 * Trace Module
 * Spans, per-thread contexts, identities, call sites, and stitching
 */

pub mod callsite;
pub mod context;
pub mod hook;
pub mod identity;
pub mod record;
pub mod snapshot;
pub mod span;

pub use callsite::{CallSite, CallSitePair};
pub use context::TraceContext;
pub use hook::{abort_open_span_on_panic, panic_abort_enabled};
pub use identity::SpanIdentity;
pub use record::{LineageEntry, SpanRecord};
pub use snapshot::SpanSnapshot;
pub use span::{AbortReason, Span, SpanStatus};

use crate::core::errors::{SpanError, SpanResult};
use std::sync::Arc;

// ============================================================================
// Free Functions
// ============================================================================

/// Create and start a span in one call
#[track_caller]
pub fn start(name: impl Into<String>) -> SpanResult<Arc<Span>> {
    start_with_context(name, Vec::new())
}

/// Create and start a span with a context payload
#[track_caller]
pub fn start_with_context(
    name: impl Into<String>,
    context: Vec<serde_json::Value>,
) -> SpanResult<Arc<Span>> {
    let site = CallSite::caller();
    let span = Span::with_context(name, context)?;
    span.start_at(site)?;
    Ok(span)
}

/// Stop the calling thread's current span
#[track_caller]
pub fn stop_current() -> SpanResult<()> {
    let site = CallSite::caller();
    let span = TraceContext::get()
        .and_then(|ctx| ctx.current_span())
        .ok_or(SpanError::NoCurrentSpan)?;
    span.stop_at(site)
}

// ============================================================================
// Scoped Guard
// ============================================================================

/// RAII guard that stops its span when dropped
///
/// An explicit [`ScopedSpan::abort`] wins over the drop stop. The stop site
/// reported on drop is the guard's creation site.
pub struct ScopedSpan {
    span: Arc<Span>,
    site: CallSite,
}

impl ScopedSpan {
    /// Start a span that stops when the guard goes out of scope
    #[track_caller]
    pub fn enter(name: impl Into<String>) -> SpanResult<Self> {
        Self::enter_with_context(name, Vec::new())
    }

    /// Scoped variant of [`start_with_context`]
    #[track_caller]
    pub fn enter_with_context(
        name: impl Into<String>,
        context: Vec<serde_json::Value>,
    ) -> SpanResult<Self> {
        let site = CallSite::caller();
        let span = Span::with_context(name, context)?;
        span.start_at(site.clone())?;
        Ok(Self { span, site })
    }

    #[inline]
    pub fn span(&self) -> &Arc<Span> {
        &self.span
    }

    /// Abort instead of letting the drop stop the span
    pub fn abort(self, reason: AbortReason) {
        let _ = self.span.abort_with(reason);
    }
}

impl Drop for ScopedSpan {
    fn drop(&mut self) {
        if self.span.is_open() {
            let _ = self.span.stop_at(self.site.clone());
        }
    }
}
