/*!
 * Trace Context
 * Per-thread span stack and root list, plus stitching of foreign trees
 */

use crate::core::config::{global_capture_level, CaptureLevel};
use crate::core::errors::SpanResult;
use crate::trace::callsite::{self, CallSite};
use crate::trace::identity::SpanIdentity;
use crate::trace::record::SpanRecord;
use crate::trace::snapshot::SpanSnapshot;
use crate::trace::span::Span;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

// ============================================================================
// Global Registry
// ============================================================================

static CONTEXTS: OnceLock<DashMapContexts> = OnceLock::new();

type DashMapContexts = dashmap::DashMap<ThreadId, Arc<TraceContext>, ahash::RandomState>;

fn contexts() -> &'static DashMapContexts {
    CONTEXTS.get_or_init(|| dashmap::DashMap::with_hasher(ahash::RandomState::new()))
}

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Default)]
struct ContextInner {
    /// Open spans, innermost last; a closed top means the owning thread
    /// moved on and the stack is stale
    stack: Vec<Arc<Span>>,
    /// Roots started or adopted on this thread, in order of appearance
    roots: Vec<Arc<Span>>,
}

/// Call-tree state for one thread
///
/// Resolved through a global map keyed by thread id; entries live until
/// [`TraceContext::cleanup`] removes them.
#[derive(Debug)]
pub struct TraceContext {
    thread_id: ThreadId,
    capture_override: Mutex<Option<CaptureLevel>>,
    inner: Mutex<ContextInner>,
}

impl TraceContext {
    fn new(thread_id: ThreadId) -> Arc<Self> {
        Arc::new(Self {
            thread_id,
            capture_override: Mutex::new(None),
            inner: Mutex::new(ContextInner::default()),
        })
    }

    /// Context for the calling thread, created on first use
    pub fn current() -> Arc<TraceContext> {
        let id = thread::current().id();
        contexts()
            .entry(id)
            .or_insert_with(|| TraceContext::new(id))
            .clone()
    }

    /// Context for the calling thread if one exists
    pub fn get() -> Option<Arc<TraceContext>> {
        contexts().get(&thread::current().id()).map(|e| e.clone())
    }

    /// Drop the calling thread's context and everything it retains
    pub fn cleanup() {
        contexts().remove(&thread::current().id());
    }

    /// Effective capture level for the calling thread
    ///
    /// A per-thread override wins over the global level. Never creates a
    /// context.
    pub fn capture_level() -> CaptureLevel {
        if let Some(ctx) = Self::get() {
            if let Some(level) = *ctx.capture_override.lock() {
                return level;
            }
        }
        global_capture_level()
    }

    /// Set or clear the calling thread's capture override
    pub fn set_capture_level(level: Option<CaptureLevel>) {
        match level {
            Some(level) => {
                *Self::current().capture_override.lock() = Some(level);
            }
            None => {
                if let Some(ctx) = Self::get() {
                    *ctx.capture_override.lock() = None;
                }
            }
        }
    }

    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Innermost span on the stack, falling back to the first root
    pub fn current_span(&self) -> Option<Arc<Span>> {
        let inner = self.inner.lock();
        inner
            .stack
            .last()
            .cloned()
            .or_else(|| inner.roots.first().cloned())
    }

    /// Innermost span that is still open
    pub(crate) fn innermost_open(&self) -> Option<Arc<Span>> {
        let inner = self.inner.lock();
        inner.stack.iter().rev().find(|span| span.is_open()).cloned()
    }

    /// Roots recorded on this thread, in order of appearance
    pub fn root_spans(&self) -> Vec<Arc<Span>> {
        self.inner.lock().roots.clone()
    }

    /// Attach and start a span on this context
    pub(crate) fn start_span(&self, span: &Arc<Span>, site: CallSite) -> SpanResult<()> {
        span.check_can_start()?;
        let mut inner = self.inner.lock();
        attach_locked(&mut inner, span);
        inner.stack.push(Arc::clone(span));
        let parent_identity = span.parent().and_then(|parent| parent.identity());
        let identity = SpanIdentity::derive(parent_identity.as_ref(), span.name(), &site);
        span.begin(identity)?;
        callsite::record_start(&identity, &site);
        Ok(())
    }

    /// Unwind a terminated span from the stack and queue its record
    pub(crate) fn finish_span(&self, span: &Arc<Span>) {
        {
            let mut inner = self.inner.lock();
            if let Some(pos) = inner.stack.iter().rposition(|s| Arc::ptr_eq(s, span)) {
                inner.stack.remove(pos);
            }
        }
        if let Some(record) = SpanRecord::from_span(span) {
            crate::registry::aggregate_record(record);
        }
    }

    // ========================================================================
    // Stitching
    // ========================================================================

    /// Stitch a span tree built elsewhere into this thread's call tree
    ///
    /// The tree attaches under the innermost open span, or becomes a new
    /// root. Already-adopted trees are left untouched. Identities carried by
    /// the tree are kept verbatim. With `aggregate` set, every finished span
    /// in the tree is fed to aggregation bottom-up, reported with the parent
    /// chain it has after attachment.
    pub fn adopt(&self, root: &Arc<Span>, aggregate: bool) {
        if root.parent().is_some() {
            return;
        }
        {
            let mut inner = self.inner.lock();
            if inner.roots.iter().any(|r| Arc::ptr_eq(r, root)) {
                return;
            }
            mark_foreign_recursive(root);
            attach_locked(&mut inner, root);
        }
        if aggregate {
            aggregate_subtree(root);
        }
    }

    /// Rebuild a snapshot as a foreign tree and stitch it in
    ///
    /// Returns the rebuilt root. Each call materializes a fresh tree.
    pub fn adopt_snapshot(&self, snapshot: &SpanSnapshot, aggregate: bool) -> Arc<Span> {
        let root = snapshot.materialize();
        self.adopt(&root, aggregate);
        root
    }
}

/// Attach under the innermost open span or as a new root
///
/// A closed span on top of the stack is stale state left by a cross-thread
/// stop; the whole stack is discarded before rooting.
fn attach_locked(inner: &mut ContextInner, span: &Arc<Span>) {
    if let Some(top) = inner.stack.last() {
        if top.is_open() {
            Span::link_child(top, span);
            return;
        }
        inner.stack.clear();
    }
    inner.roots.push(Arc::clone(span));
}

fn mark_foreign_recursive(span: &Arc<Span>) {
    span.mark_foreign();
    for child in span.children() {
        mark_foreign_recursive(&child);
    }
}

fn aggregate_subtree(span: &Arc<Span>) {
    for child in span.children() {
        aggregate_subtree(&child);
    }
    if let Some(record) = SpanRecord::from_span(span) {
        crate::registry::aggregate_record(record);
    }
}
