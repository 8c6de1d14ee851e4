/*!
 * Aggregation Node
 * One key's accumulator within a factory's tree, with lazy child creation
 */

use crate::aggregation::key::AggregationKey;
use crate::aggregation::persistence::NodeSnapshot;
use crate::aggregation::stats::{AggregateStats, StatsKind};
use crate::trace::identity::SpanIdentity;
use crate::trace::record::SpanRecord;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One node of an aggregation tree
///
/// `span_name` and `span_identity` describe the first span that created the
/// node; under coarse key strategies later spans may differ in identity.
#[derive(Debug)]
pub struct AggregationNode {
    key: AggregationKey,
    span_name: String,
    span_identity: SpanIdentity,
    /// Root depth is 1
    depth: u32,
    children: RwLock<BTreeMap<AggregationKey, Arc<AggregationNode>>>,
    stats: Mutex<AggregateStats>,
}

impl AggregationNode {
    pub(crate) fn new(
        key: AggregationKey,
        span_name: &str,
        span_identity: SpanIdentity,
        depth: u32,
        kind: StatsKind,
    ) -> Arc<Self> {
        Arc::new(Self {
            key,
            span_name: span_name.to_string(),
            span_identity,
            depth,
            children: RwLock::new(BTreeMap::new()),
            stats: Mutex::new(kind.empty_stats()),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn key(&self) -> &AggregationKey {
        &self.key
    }

    #[inline]
    pub fn span_name(&self) -> &str {
        &self.span_name
    }

    #[inline]
    pub fn span_identity(&self) -> SpanIdentity {
        self.span_identity
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn stats(&self) -> AggregateStats {
        self.stats.lock().clone()
    }

    pub fn measurements(&self) -> u64 {
        self.stats.lock().measurements()
    }

    pub fn child(&self, key: &AggregationKey) -> Option<Arc<AggregationNode>> {
        self.children.read().get(key).cloned()
    }

    /// Children in key order
    pub fn children(&self) -> Vec<Arc<AggregationNode>> {
        self.children.read().values().cloned().collect()
    }

    pub fn child_count(&self) -> usize {
        self.children.read().len()
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    pub(crate) fn record(&self, record: &Arc<SpanRecord>) {
        self.stats.lock().record(record);
    }

    /// Find or create the child for `key`
    ///
    /// Optimistic read first, write lock with re-check only on miss, so
    /// concurrent first-time creation yields exactly one node. The flag
    /// reports whether this call created it.
    pub(crate) fn child_or_create(
        &self,
        key: &AggregationKey,
        span_name: &str,
        span_identity: SpanIdentity,
        kind: StatsKind,
    ) -> (Arc<AggregationNode>, bool) {
        if let Some(existing) = self.children.read().get(key) {
            return (Arc::clone(existing), false);
        }
        let mut children = self.children.write();
        if let Some(existing) = children.get(key) {
            return (Arc::clone(existing), false);
        }
        let node = AggregationNode::new(key.clone(), span_name, span_identity, self.depth + 1, kind);
        children.insert(key.clone(), Arc::clone(&node));
        (node, true)
    }

    /// Insert a prebuilt child, keeping any child that raced in first
    pub(crate) fn adopt_child(&self, child: Arc<AggregationNode>) -> Arc<AggregationNode> {
        let mut children = self.children.write();
        Arc::clone(
            children
                .entry(child.key.clone())
                .or_insert(child),
        )
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    pub(crate) fn to_snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            key: self.key.clone(),
            span_name: self.span_name.clone(),
            span_identity: self.span_identity,
            stats: self.stats.lock().clone(),
            children: self
                .children
                .read()
                .values()
                .map(|child| child.to_snapshot())
                .collect(),
        }
    }

    pub(crate) fn from_snapshot(snapshot: &NodeSnapshot, depth: u32) -> Arc<AggregationNode> {
        let node = Arc::new(AggregationNode {
            key: snapshot.key.clone(),
            span_name: snapshot.span_name.clone(),
            span_identity: snapshot.span_identity,
            depth,
            children: RwLock::new(BTreeMap::new()),
            stats: Mutex::new(snapshot.stats.clone()),
        });
        let children: BTreeMap<AggregationKey, Arc<AggregationNode>> = snapshot
            .children
            .iter()
            .map(|child| {
                let built = Self::from_snapshot(child, depth + 1);
                (built.key.clone(), built)
            })
            .collect();
        *node.children.write() = children;
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::span::SpanStatus;
    use std::sync::Barrier;

    fn identity(tag: u8) -> SpanIdentity {
        SpanIdentity::from_bytes([tag; 16])
    }

    fn record(duration: u64) -> Arc<SpanRecord> {
        Arc::new(SpanRecord {
            identity: identity(1),
            name: "work".to_string(),
            status: SpanStatus::Stopped,
            start_millis: 0,
            duration_nanos: duration,
            own_duration_nanos: duration as i64,
            depth: 1,
            lineage: Vec::new(),
            context: Vec::new(),
            debug_lines: Vec::new(),
            abort: None,
            foreign: false,
        })
    }

    fn root() -> Arc<AggregationNode> {
        AggregationNode::new(
            AggregationKey::Name("root".to_string()),
            "root",
            identity(0),
            1,
            StatsKind::Execution,
        )
    }

    #[test]
    fn test_child_or_create_returns_same_node() {
        let root = root();
        let key = AggregationKey::Name("child".to_string());
        let (first, created_first) = root.child_or_create(&key, "child", identity(2), StatsKind::Execution);
        let (second, created_second) = root.child_or_create(&key, "child", identity(3), StatsKind::Execution);

        assert!(created_first);
        assert!(!created_second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.depth(), 2);
        assert_eq!(root.child_count(), 1);
    }

    #[test]
    fn test_concurrent_creation_yields_one_node() {
        let root = root();
        let barrier = Arc::new(Barrier::new(8));
        let key = AggregationKey::Name("contended".to_string());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let root = Arc::clone(&root);
                let barrier = Arc::clone(&barrier);
                let key = key.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    root.child_or_create(&key, "contended", identity(9), StatsKind::Execution)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let created = results.iter().filter(|(_, created)| *created).count();
        assert_eq!(created, 1);
        assert!(results
            .iter()
            .all(|(node, _)| Arc::ptr_eq(node, &results[0].0)));
        assert_eq!(root.child_count(), 1);
    }

    #[test]
    fn test_record_accumulates_stats() {
        let node = root();
        node.record(&record(100));
        node.record(&record(300));

        assert_eq!(node.measurements(), 2);
        let stats = node.stats();
        let execution = stats.execution().unwrap();
        assert_eq!(execution.min_nanos, 100);
        assert_eq!(execution.max_nanos, 300);
    }

    #[test]
    fn test_snapshot_round_trip_preserves_shape() {
        let root = root();
        root.record(&record(100));
        let (child, _) = root.child_or_create(
            &AggregationKey::Name("leaf".to_string()),
            "leaf",
            identity(2),
            StatsKind::Execution,
        );
        child.record(&record(50));

        let snapshot = root.to_snapshot();
        let rebuilt = AggregationNode::from_snapshot(&snapshot, 1);

        assert_eq!(rebuilt.key(), root.key());
        assert_eq!(rebuilt.measurements(), 1);
        assert_eq!(rebuilt.child_count(), 1);
        let rebuilt_child = rebuilt.child(&AggregationKey::Name("leaf".to_string())).unwrap();
        assert_eq!(rebuilt_child.depth(), 2);
        assert_eq!(rebuilt_child.measurements(), 1);
    }
}
