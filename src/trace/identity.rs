/*!
 * Span Identity
 * Deterministic, content-derived span identity with total ordering
 */

use crate::trace::callsite::CallSite;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;

/// Content-derived span identity
///
/// Digest of `parent_identity + "/" + name + call_site`, so two spans from the
/// same logical call site under the same parent share an identity. That
/// collision is intentional: call-site metadata is cached once per logical
/// call site, not per invocation.
///
/// Byte-wise equality and ordering; renders as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpanIdentity([u8; 16]);

impl SpanIdentity {
    /// Digest width in bytes
    pub const LEN: usize = 16;

    /// Derive an identity from the parent identity (absent for roots), the
    /// span name, and the start call site
    ///
    /// Pure and reproducible across processes.
    pub fn derive(parent: Option<&SpanIdentity>, name: &str, site: &CallSite) -> Self {
        let mut path = String::with_capacity(64);
        if let Some(parent) = parent {
            let _ = write!(path, "{parent}");
        }
        path.push('/');
        path.push_str(name);
        let _ = write!(path, "{site}");
        SpanIdentity(md5::compute(path.as_bytes()).0)
    }

    /// Raw digest bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Rebuild an identity from raw digest bytes
    #[inline]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        SpanIdentity(bytes)
    }
}

impl fmt::Display for SpanIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(file: &'static str, line: u32, column: u32) -> CallSite {
        CallSite::new(file, line, column)
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = SpanIdentity::derive(None, "fetch", &site("app.rs", 10, 5));
        let b = SpanIdentity::derive(None, "fetch", &site("app.rs", 10, 5));
        assert_eq!(a, b);
    }

    #[test]
    fn test_each_component_changes_identity() {
        let base = SpanIdentity::derive(None, "fetch", &site("app.rs", 10, 5));
        let parent = SpanIdentity::derive(None, "outer", &site("app.rs", 1, 1));

        let other_parent = SpanIdentity::derive(Some(&parent), "fetch", &site("app.rs", 10, 5));
        let other_name = SpanIdentity::derive(None, "store", &site("app.rs", 10, 5));
        let other_site = SpanIdentity::derive(None, "fetch", &site("app.rs", 11, 5));

        assert_ne!(base, other_parent);
        assert_ne!(base, other_name);
        assert_ne!(base, other_site);
    }

    #[test]
    fn test_hex_rendering() {
        let id = SpanIdentity::from_bytes([0x00, 0x01, 0xab, 0xff, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x10]);
        let hex = id.to_string();
        assert_eq!(hex.len(), 32);
        assert!(hex.starts_with("0001abff"));
        assert!(hex.ends_with("10"));
        assert_eq!(hex, hex.to_lowercase());
    }

    #[test]
    fn test_byte_wise_ordering() {
        let low = SpanIdentity::from_bytes([0; 16]);
        let high = SpanIdentity::from_bytes([1; 16]);
        assert!(low < high);

        let mut sorted = vec![high, low];
        sorted.sort();
        assert_eq!(sorted, vec![low, high]);
    }

    #[test]
    fn test_round_trip_bytes() {
        let id = SpanIdentity::derive(None, "work", &site("lib.rs", 42, 9));
        assert_eq!(SpanIdentity::from_bytes(*id.as_bytes()), id);
    }
}
