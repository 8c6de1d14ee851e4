/*!
 * Panic Hook
 * Opt-in abort of the innermost open span when the owning thread panics
 */

use crate::trace::callsite::CallSite;
use crate::trace::context::TraceContext;
use crate::trace::span::AbortReason;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static ENABLED: AtomicBool = AtomicBool::new(false);
static INSTALL: Once = Once::new();

/// Enable or disable aborting the innermost open span on panic
///
/// The hook is installed once, chains to the previously installed hook, and
/// does nothing while disabled. Spans aborted this way carry the panic
/// message and the panic location as the abort origin.
pub fn abort_open_span_on_panic(enabled: bool) {
    ENABLED.store(enabled, Ordering::SeqCst);
    if enabled {
        INSTALL.call_once(install);
    }
}

/// Whether panic aborts are currently enabled
pub fn panic_abort_enabled() -> bool {
    ENABLED.load(Ordering::SeqCst)
}

fn install() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if ENABLED.load(Ordering::SeqCst) {
            let message = payload_message(info.payload());
            let origin = info
                .location()
                .map(|loc| CallSite::new(loc.file().to_string(), loc.line(), loc.column()));
            // a panic inside the hook must not take down the unwinding thread
            let _ = std::panic::catch_unwind(AssertUnwindSafe(|| {
                abort_innermost(message, origin);
            }));
        }
        previous(info);
    }));
}

fn abort_innermost(message: String, origin: Option<CallSite>) {
    let Some(ctx) = TraceContext::get() else {
        return;
    };
    let Some(span) = ctx.innermost_open() else {
        return;
    };
    let mut reason = AbortReason::new(message);
    if let Some(origin) = origin {
        reason = reason.with_origin(origin);
    }
    let _ = span.abort_with(reason);
}

fn payload_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
