/*!
 * Call Sites
 * Source locations of span start/stop calls and the global per-identity cache
 */

use crate::trace::identity::SpanIdentity;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::panic::Location;
use std::sync::OnceLock;

/// Source location of a start/stop/abort call
///
/// Captured from `#[track_caller]` locations for live spans; owned strings
/// when rebuilt from a deserialized snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSite {
    pub file: Cow<'static, str>,
    pub line: u32,
    pub column: u32,
}

impl CallSite {
    pub fn new(file: impl Into<Cow<'static, str>>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// Zero-copy capture from a caller location
    #[inline]
    pub fn from_location(location: &'static Location<'static>) -> Self {
        Self {
            file: Cow::Borrowed(location.file()),
            line: location.line(),
            column: location.column(),
        }
    }

    /// Call site of the immediate caller
    #[track_caller]
    #[inline]
    pub fn caller() -> Self {
        Self::from_location(Location::caller())
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Start/stop call-site pair for one span identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSitePair {
    pub start: CallSite,
    pub stop: Option<CallSite>,
}

// ============================================================================
// Global Cache
// ============================================================================

// One entry per distinct identity; identity collision across invocations of
// the same logical call site is what makes this cache bounded.

static SITES: OnceLock<DashMap<SpanIdentity, CallSitePair, ahash::RandomState>> = OnceLock::new();

fn sites() -> &'static DashMap<SpanIdentity, CallSitePair, ahash::RandomState> {
    SITES.get_or_init(|| DashMap::with_hasher(ahash::RandomState::new()))
}

/// Record the start site for an identity; first writer wins
pub(crate) fn record_start(identity: &SpanIdentity, site: &CallSite) {
    sites().entry(*identity).or_insert_with(|| CallSitePair {
        start: site.clone(),
        stop: None,
    });
}

/// Fill in the stop site for an identity if not already set
pub(crate) fn record_stop(identity: &SpanIdentity, site: &CallSite) {
    if let Some(mut entry) = sites().get_mut(identity) {
        if entry.stop.is_none() {
            entry.stop = Some(site.clone());
        }
    }
}

/// Insert a full pair for an identity imported from elsewhere; first writer wins
pub(crate) fn record_pair(identity: &SpanIdentity, pair: CallSitePair) {
    sites().entry(*identity).or_insert(pair);
}

/// Look up the cached call sites for an identity
pub fn lookup(identity: &SpanIdentity) -> Option<CallSitePair> {
    sites().get(identity).map(|entry| entry.clone())
}
