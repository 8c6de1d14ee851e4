/*!
 * Core Module
 * Shared configuration, limits, codec, and error handling
 */

pub mod codec;
pub mod config;
pub mod errors;
pub mod limits;

// Re-export for convenience
pub use config::{global_capture_level, set_capture_level, CaptureLevel};
pub use errors::*;
