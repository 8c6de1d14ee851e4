/*!
 * Span
 * The unit of measurement: timing, hierarchy, context payload, abort state
 */

use crate::core::errors::{SpanError, SpanResult};
use crate::trace::callsite::{self, CallSite};
use crate::trace::context::TraceContext;
use crate::trace::identity::SpanIdentity;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Span lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    New,
    Started,
    Stopped,
    Aborted,
}

/// Why a span was aborted, with the origin of the failure when known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortReason {
    pub message: String,
    pub origin: Option<CallSite>,
}

impl AbortReason {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            origin: None,
        }
    }

    /// Attach the origin call site of the failure
    pub fn with_origin(mut self, origin: CallSite) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Build a reason from any error's display text
    pub fn from_error(err: &(dyn std::error::Error + '_)) -> Self {
        Self::new(err.to_string())
    }
}

#[derive(Debug, Default)]
struct Lifecycle {
    identity: Option<SpanIdentity>,
    start_wall_millis: Option<u64>,
    started_at: Option<Instant>,
    duration: Option<Duration>,
    abort: Option<AbortReason>,
}

/// A timed unit of work
///
/// Created unstarted, started once, then stopped or aborted exactly once.
/// Parent links are non-owning; a parent owns its children. A span must be
/// started and stopped on the thread whose call tree it belongs to; trees
/// built elsewhere enter through [`TraceContext::adopt`].
#[derive(Debug)]
pub struct Span {
    name: String,
    context: Vec<serde_json::Value>,
    debug_lines: Mutex<Vec<String>>,
    lifecycle: Mutex<Lifecycle>,
    parent: RwLock<Weak<Span>>,
    children: RwLock<Vec<Arc<Span>>>,
    foreign: AtomicBool,
}

impl Span {
    /// Create an unstarted span
    pub fn new(name: impl Into<String>) -> SpanResult<Arc<Self>> {
        Self::with_context(name, Vec::new())
    }

    /// Create an unstarted span with a context payload
    ///
    /// The payload is kept only when the current capture level enables
    /// context capture.
    pub fn with_context(
        name: impl Into<String>,
        context: Vec<serde_json::Value>,
    ) -> SpanResult<Arc<Self>> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SpanError::EmptyName);
        }
        let context = if TraceContext::capture_level().context_enabled() {
            context
        } else {
            Vec::new()
        };
        Ok(Arc::new(Self {
            name,
            context,
            debug_lines: Mutex::new(Vec::new()),
            lifecycle: Mutex::new(Lifecycle::default()),
            parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
            foreign: AtomicBool::new(false),
        }))
    }

    /// Rebuild a span from imported parts; imported spans are terminal
    pub(crate) fn from_parts(
        name: String,
        context: Vec<serde_json::Value>,
        debug_lines: Vec<String>,
        identity: Option<SpanIdentity>,
        start_wall_millis: Option<u64>,
        duration: Option<Duration>,
        abort: Option<AbortReason>,
        foreign: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            context,
            debug_lines: Mutex::new(debug_lines),
            lifecycle: Mutex::new(Lifecycle {
                identity,
                start_wall_millis,
                started_at: None,
                duration,
                abort,
            }),
            parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
            foreign: AtomicBool::new(foreign),
        })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the span on the calling thread
    ///
    /// Attaches it under the thread's innermost open span (or as a new root),
    /// captures clocks, and derives the identity from the caller's call site.
    #[track_caller]
    pub fn start(self: &Arc<Self>) -> SpanResult<()> {
        self.start_at(CallSite::caller())
    }

    pub(crate) fn start_at(self: &Arc<Self>, site: CallSite) -> SpanResult<()> {
        TraceContext::current().start_span(self, site)
    }

    /// Stop the span, freezing its duration and feeding it to aggregation
    ///
    /// No-op if the span was already aborted; abort pre-empts stop.
    #[track_caller]
    pub fn stop(self: &Arc<Self>) -> SpanResult<()> {
        self.stop_at(CallSite::caller())
    }

    pub(crate) fn stop_at(self: &Arc<Self>, site: CallSite) -> SpanResult<()> {
        let identity = {
            let mut lc = self.lifecycle.lock();
            if lc.abort.is_some() {
                return Ok(());
            }
            if lc.duration.is_some() {
                return Err(SpanError::AlreadyStopped(self.name.clone()));
            }
            let started_at = match lc.started_at {
                Some(at) => at,
                None => return Err(SpanError::NotStarted(self.name.clone())),
            };
            lc.duration = Some(started_at.elapsed());
            lc.identity
        };
        if let Some(identity) = &identity {
            callsite::record_stop(identity, &site);
        }
        TraceContext::current().finish_span(self);
        Ok(())
    }

    /// Abort the span without an explicit reason
    ///
    /// Synthesizes a generic reason with the caller's call site as origin.
    /// No-op if the span is already stopped or aborted.
    #[track_caller]
    pub fn abort(self: &Arc<Self>) -> SpanResult<()> {
        self.abort_at(None, CallSite::caller())
    }

    /// Abort the span with a reason
    ///
    /// The reason's origin, when set, becomes the recorded stop site;
    /// otherwise the caller's call site is used.
    #[track_caller]
    pub fn abort_with(self: &Arc<Self>, reason: AbortReason) -> SpanResult<()> {
        self.abort_at(Some(reason), CallSite::caller())
    }

    pub(crate) fn abort_at(
        self: &Arc<Self>,
        reason: Option<AbortReason>,
        fallback: CallSite,
    ) -> SpanResult<()> {
        let (identity, stop_site) = {
            let mut lc = self.lifecycle.lock();
            if lc.duration.is_some() || lc.abort.is_some() {
                return Ok(());
            }
            let started_at = match lc.started_at {
                Some(at) => at,
                None => return Err(SpanError::NotStarted(self.name.clone())),
            };
            lc.duration = Some(started_at.elapsed());
            let mut reason =
                reason.unwrap_or_else(|| AbortReason::new("span aborted without an error"));
            if reason.origin.is_none() {
                reason.origin = Some(fallback);
            }
            let stop_site = reason.origin.clone();
            lc.abort = Some(reason);
            (lc.identity, stop_site)
        };
        if let (Some(identity), Some(site)) = (&identity, &stop_site) {
            callsite::record_stop(identity, site);
        }
        TraceContext::current().finish_span(self);
        Ok(())
    }

    /// Append a debug line; kept only when debug capture is enabled
    pub fn debug(&self, line: impl Into<String>) {
        if TraceContext::capture_level().debug_enabled() {
            self.debug_lines.lock().push(line.into());
        }
    }

    // ========================================================================
    // State
    // ========================================================================

    pub fn status(&self) -> SpanStatus {
        let lc = self.lifecycle.lock();
        if lc.abort.is_some() {
            SpanStatus::Aborted
        } else if lc.duration.is_some() {
            SpanStatus::Stopped
        } else if lc.started_at.is_some() || lc.start_wall_millis.is_some() {
            SpanStatus::Started
        } else {
            SpanStatus::New
        }
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.status() != SpanStatus::New
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.status() == SpanStatus::Stopped
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.status() == SpanStatus::Aborted
    }

    /// Started and not yet terminated
    pub(crate) fn is_open(&self) -> bool {
        self.status() == SpanStatus::Started
    }

    pub(crate) fn check_can_start(&self) -> SpanResult<()> {
        let lc = self.lifecycle.lock();
        if lc.started_at.is_some() || lc.start_wall_millis.is_some() {
            if lc.duration.is_some() || lc.abort.is_some() {
                return Err(SpanError::AlreadyStopped(self.name.clone()));
            }
            return Err(SpanError::AlreadyStarted(self.name.clone()));
        }
        Ok(())
    }

    /// Capture clocks and identity; final gate against double start
    pub(crate) fn begin(&self, identity: SpanIdentity) -> SpanResult<()> {
        let mut lc = self.lifecycle.lock();
        if lc.started_at.is_some() || lc.start_wall_millis.is_some() {
            return Err(SpanError::AlreadyStarted(self.name.clone()));
        }
        lc.start_wall_millis = Some(wall_clock_millis());
        lc.started_at = Some(Instant::now());
        lc.identity = Some(identity);
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> Option<SpanIdentity> {
        self.lifecycle.lock().identity
    }

    /// Wall-clock start time in milliseconds since the epoch
    pub fn start_wall_millis(&self) -> Option<u64> {
        self.lifecycle.lock().start_wall_millis
    }

    /// Frozen duration after stop/abort; live elapsed time while running
    pub fn duration(&self) -> Option<Duration> {
        let lc = self.lifecycle.lock();
        if let Some(frozen) = lc.duration {
            return Some(frozen);
        }
        lc.started_at.map(|at| at.elapsed())
    }

    pub fn duration_nanos(&self) -> Option<u64> {
        self.duration().map(|d| d.as_nanos() as u64)
    }

    /// Duration minus the direct children's durations
    ///
    /// Negative values indicate overlapping children, which is a caller
    /// error; the value is reported as-is.
    pub fn own_duration_nanos(&self) -> Option<i64> {
        let total = self.duration_nanos()? as i64;
        let children: i64 = self
            .children
            .read()
            .iter()
            .filter_map(|child| child.duration_nanos())
            .map(|nanos| nanos as i64)
            .sum();
        Some(total - children)
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.lifecycle.lock().abort.clone()
    }

    /// Context payload captured at construction
    pub fn context(&self) -> &[serde_json::Value] {
        &self.context
    }

    pub fn debug_lines(&self) -> Vec<String> {
        self.debug_lines.lock().clone()
    }

    pub fn parent(&self) -> Option<Arc<Span>> {
        self.parent.read().upgrade()
    }

    pub fn children(&self) -> Vec<Arc<Span>> {
        self.children.read().clone()
    }

    pub fn child_count(&self) -> usize {
        self.children.read().len()
    }

    /// Root depth is 1; each nesting level adds one
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self.parent();
        while let Some(parent) = current {
            depth += 1;
            current = parent.parent();
        }
        depth
    }

    /// True when the span was stitched in from another thread or process
    #[inline]
    pub fn is_foreign(&self) -> bool {
        self.foreign.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_foreign(&self) {
        self.foreign.store(true, Ordering::Relaxed);
    }

    /// Start call site recorded for this span's identity
    pub fn start_site(&self) -> Option<CallSite> {
        self.identity()
            .and_then(|id| callsite::lookup(&id))
            .map(|pair| pair.start)
    }

    /// Stop call site recorded for this span's identity
    pub fn stop_site(&self) -> Option<CallSite> {
        self.identity()
            .and_then(|id| callsite::lookup(&id))
            .and_then(|pair| pair.stop)
    }

    /// Attach `child` under `parent` in both directions
    pub(crate) fn link_child(parent: &Arc<Span>, child: &Arc<Span>) {
        parent.children.write().push(Arc::clone(child));
        *child.parent.write() = Arc::downgrade(parent);
    }
}

pub(crate) fn wall_clock_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
