/*!
 * Capture Configuration
 * Process-wide capture level controlling how much data spans record
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

/// How much data spans capture, from nothing to full debug payloads
///
/// Levels are ordered: each level includes everything below it.
/// - `Quiet`: instrumentation layers should skip measuring entirely
/// - `Measurement`: timing and hierarchy only (the default)
/// - `Context`: additionally capture context payloads at construction
/// - `Debug`: additionally record debug lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureLevel {
    Quiet,
    Measurement,
    Context,
    Debug,
}

impl CaptureLevel {
    /// True when timing should be captured at all
    #[inline]
    pub fn measurement_enabled(self) -> bool {
        self >= CaptureLevel::Measurement
    }

    /// True when context payloads are captured at span construction
    #[inline]
    pub fn context_enabled(self) -> bool {
        self >= CaptureLevel::Context
    }

    /// True when debug lines are recorded
    #[inline]
    pub fn debug_enabled(self) -> bool {
        self >= CaptureLevel::Debug
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => CaptureLevel::Quiet,
            1 => CaptureLevel::Measurement,
            2 => CaptureLevel::Context,
            _ => CaptureLevel::Debug,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "quiet" => Some(CaptureLevel::Quiet),
            "measurement" => Some(CaptureLevel::Measurement),
            "context" => Some(CaptureLevel::Context),
            "debug" => Some(CaptureLevel::Debug),
            _ => None,
        }
    }
}

impl Default for CaptureLevel {
    fn default() -> Self {
        CaptureLevel::Measurement
    }
}

static GLOBAL_LEVEL: OnceLock<AtomicU8> = OnceLock::new();

fn global_cell() -> &'static AtomicU8 {
    GLOBAL_LEVEL.get_or_init(|| {
        let seed = std::env::var("TRACERY_CAPTURE_LEVEL")
            .ok()
            .and_then(|v| CaptureLevel::parse(&v))
            .unwrap_or_default();
        AtomicU8::new(seed as u8)
    })
}

/// Process-wide capture level; per-thread overrides win over this
///
/// Seeded once from `TRACERY_CAPTURE_LEVEL` (quiet/measurement/context/debug).
pub fn global_capture_level() -> CaptureLevel {
    CaptureLevel::from_u8(global_cell().load(Ordering::Relaxed))
}

/// Set the process-wide capture level
pub fn set_capture_level(level: CaptureLevel) {
    global_cell().store(level as u8, Ordering::Relaxed);
}
