/*!
 * Aggregation Keys
 * Grouping keys and the pluggable strategies that map spans onto them
 */

use crate::trace::identity::SpanIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Grouping key for one aggregation tree node
///
/// Totally ordered so keys can index sorted node maps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKey {
    /// One key per distinct span identity
    Identity(SpanIdentity),
    /// One key per span name, regardless of call site
    Name(String),
    /// A single process-wide key
    Global,
}

impl fmt::Display for AggregationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationKey::Identity(identity) => write!(f, "{}", identity),
            AggregationKey::Name(name) => f.write_str(name),
            AggregationKey::Global => f.write_str("global"),
        }
    }
}

/// How a factory maps spans to keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Finest granularity; the tree mirrors the call tree exactly
    ByIdentity,
    /// Recursion and same-named siblings collapse into one node
    ByName,
    /// Everything lands on one node
    Singleton,
}

impl KeyStrategy {
    pub fn key_of(&self, identity: &SpanIdentity, name: &str) -> AggregationKey {
        match self {
            KeyStrategy::ByIdentity => AggregationKey::Identity(*identity),
            KeyStrategy::ByName => AggregationKey::Name(name.to_string()),
            KeyStrategy::Singleton => AggregationKey::Global,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::callsite::CallSite;

    fn identity(line: u32) -> SpanIdentity {
        SpanIdentity::derive(None, "work", &CallSite::new("app.rs", line, 1))
    }

    #[test]
    fn test_strategies_map_to_expected_keys() {
        let id = identity(10);
        assert_eq!(
            KeyStrategy::ByIdentity.key_of(&id, "work"),
            AggregationKey::Identity(id)
        );
        assert_eq!(
            KeyStrategy::ByName.key_of(&id, "work"),
            AggregationKey::Name("work".to_string())
        );
        assert_eq!(KeyStrategy::Singleton.key_of(&id, "work"), AggregationKey::Global);
    }

    #[test]
    fn test_by_name_ignores_identity() {
        let strategy = KeyStrategy::ByName;
        assert_eq!(
            strategy.key_of(&identity(10), "work"),
            strategy.key_of(&identity(20), "work")
        );
        assert_ne!(
            strategy.key_of(&identity(10), "work"),
            strategy.key_of(&identity(10), "other")
        );
    }

    #[test]
    fn test_key_ordering_is_total() {
        let mut keys = vec![
            AggregationKey::Global,
            AggregationKey::Name("b".to_string()),
            AggregationKey::Identity(identity(10)),
            AggregationKey::Name("a".to_string()),
        ];
        keys.sort();
        assert!(matches!(keys[0], AggregationKey::Identity(_)));
        assert_eq!(keys[1], AggregationKey::Name("a".to_string()));
        assert_eq!(keys[2], AggregationKey::Name("b".to_string()));
        assert_eq!(keys[3], AggregationKey::Global);
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(AggregationKey::Name("fetch".to_string()).to_string(), "fetch");
        assert_eq!(AggregationKey::Global.to_string(), "global");
        assert_eq!(AggregationKey::Identity(identity(10)).to_string().len(), 32);
    }
}
