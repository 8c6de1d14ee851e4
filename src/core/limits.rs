/*!
 * Tuning Constants
 * Centralized location for queue depths, ranking caps, and defaults
 */

// =============================================================================
// WORKER BACKPRESSURE
// =============================================================================

/// Drain-signal channel depth: one pass running, one pending
/// A full channel means a pass is already scheduled; the signal is dropped
/// and the queued record is picked up by that pass.
pub const DRAIN_SIGNAL_DEPTH: usize = 2;

/// Per-factory dispatch channel depth for the per-factory strategy
/// Zero makes the channel a rendezvous: a hand-off succeeds only while the
/// factory's thread is waiting, so a busy factory rejects instead of queueing.
pub const FACTORY_DISPATCH_DEPTH: usize = 0;

// =============================================================================
// RANKING CAPS
// =============================================================================

/// Default entry cap for top-span rankings
pub const DEFAULT_TOP_SPANS: usize = 10;

/// Default entry cap for hotspot rankings
pub const DEFAULT_HOTSPOTS: usize = 20;

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Default snapshot file name when only a directory is configured
pub const DEFAULT_SNAPSHOT_FILE: &str = "aggregations.bin";
