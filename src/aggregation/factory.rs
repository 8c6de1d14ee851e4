/*!
 * Aggregation Factory
 * Owns one aggregation tree: root map, flat key lookup, snapshot export/import
 */

use crate::aggregation::key::{AggregationKey, KeyStrategy};
use crate::aggregation::node::AggregationNode;
use crate::aggregation::persistence::{FactorySnapshot, NodeSnapshot};
use crate::aggregation::stats::StatsKind;
use crate::core::limits::{DEFAULT_HOTSPOTS, DEFAULT_TOP_SPANS};
use crate::trace::identity::SpanIdentity;
use crate::trace::record::SpanRecord;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Owner of one aggregation tree
///
/// Records walk their lineage root-first; consecutive lineage steps mapping
/// to the same key collapse into one node, so by-name recursion accumulates
/// on a single node. The flat index answers key-only queries in O(1) and
/// keeps the first node created for each key.
#[derive(Debug)]
pub struct AggregationFactory {
    name: String,
    strategy: KeyStrategy,
    kind: StatsKind,
    roots: RwLock<BTreeMap<AggregationKey, Arc<AggregationNode>>>,
    index: dashmap::DashMap<AggregationKey, Arc<AggregationNode>, ahash::RandomState>,
}

impl AggregationFactory {
    pub fn new(name: impl Into<String>, strategy: KeyStrategy, kind: StatsKind) -> Self {
        Self {
            name: name.into(),
            strategy,
            kind,
            roots: RwLock::new(BTreeMap::new()),
            index: dashmap::DashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    /// Execution statistics per distinct call site
    pub fn execution(name: impl Into<String>) -> Self {
        Self::new(name, KeyStrategy::ByIdentity, StatsKind::Execution)
    }

    /// Slowest spans per name
    pub fn top_spans(name: impl Into<String>) -> Self {
        Self::new(
            name,
            KeyStrategy::ByName,
            StatsKind::TopSpans {
                capacity: DEFAULT_TOP_SPANS,
            },
        )
    }

    /// Process-wide ranking by own duration
    pub fn hotspot(name: impl Into<String>) -> Self {
        Self::new(
            name,
            KeyStrategy::Singleton,
            StatsKind::Hotspot {
                capacity: DEFAULT_HOTSPOTS,
            },
        )
    }

    pub fn with_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Adjust the ranking capacity; no effect on execution statistics
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.kind = match self.kind {
            StatsKind::Execution => StatsKind::Execution,
            StatsKind::TopSpans { .. } => StatsKind::TopSpans { capacity },
            StatsKind::Hotspot { .. } => StatsKind::Hotspot { capacity },
        };
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn strategy(&self) -> KeyStrategy {
        self.strategy
    }

    #[inline]
    pub fn kind(&self) -> StatsKind {
        self.kind
    }

    /// Root nodes in key order
    pub fn roots(&self) -> Vec<Arc<AggregationNode>> {
        self.roots.read().values().cloned().collect()
    }

    /// Key-only lookup against the flat index
    pub fn lookup(&self, key: &AggregationKey) -> Option<Arc<AggregationNode>> {
        self.index.get(key).map(|entry| Arc::clone(&entry))
    }

    /// Lookup by span coordinates under this factory's strategy
    pub fn lookup_span(&self, identity: &SpanIdentity, name: &str) -> Option<Arc<AggregationNode>> {
        self.lookup(&self.strategy.key_of(identity, name))
    }

    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    // ========================================================================
    // Aggregation
    // ========================================================================

    /// Resolve the record's node and fold it into the node's statistics
    pub fn aggregate(&self, record: &Arc<SpanRecord>) {
        let node = self.node_for_record(record);
        node.record(record);
    }

    fn node_for_record(&self, record: &Arc<SpanRecord>) -> Arc<AggregationNode> {
        let mut steps = record
            .lineage
            .iter()
            .map(|entry| (entry.identity, entry.name.as_str()))
            .chain(std::iter::once((record.identity, record.name.as_str())));

        // the chain always ends with the record itself
        let (first_identity, first_name) = steps
            .next()
            .unwrap_or((record.identity, record.name.as_str()));
        let first_key = self.strategy.key_of(&first_identity, first_name);
        let mut node = self.root_or_create(&first_key, first_name, first_identity);

        for (identity, name) in steps {
            let key = self.strategy.key_of(&identity, name);
            if *node.key() == key {
                continue;
            }
            let (child, created) = node.child_or_create(&key, name, identity, self.kind);
            if created {
                self.index_node(&child);
            }
            node = child;
        }
        node
    }

    fn root_or_create(
        &self,
        key: &AggregationKey,
        span_name: &str,
        span_identity: SpanIdentity,
    ) -> Arc<AggregationNode> {
        if let Some(existing) = self.roots.read().get(key) {
            return Arc::clone(existing);
        }
        let mut roots = self.roots.write();
        if let Some(existing) = roots.get(key) {
            return Arc::clone(existing);
        }
        let node = AggregationNode::new(key.clone(), span_name, span_identity, 1, self.kind);
        roots.insert(key.clone(), Arc::clone(&node));
        drop(roots);
        self.index_node(&node);
        node
    }

    fn index_node(&self, node: &Arc<AggregationNode>) {
        self.index
            .entry(node.key().clone())
            .or_insert_with(|| Arc::clone(node));
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    pub fn to_snapshot(&self) -> FactorySnapshot {
        FactorySnapshot {
            factory: self.name.clone(),
            roots: self
                .roots
                .read()
                .values()
                .map(|node| node.to_snapshot())
                .collect(),
        }
    }

    /// Merge a persisted snapshot in
    ///
    /// Nodes already present keep their live statistics; only subtrees the
    /// tree does not have yet are inserted.
    pub fn import(&self, snapshot: &FactorySnapshot) {
        for root_snapshot in &snapshot.roots {
            let existing = self.roots.read().get(&root_snapshot.key).cloned();
            match existing {
                Some(node) => self.merge_children(&node, root_snapshot),
                None => {
                    let built = AggregationNode::from_snapshot(root_snapshot, 1);
                    let node = {
                        let mut roots = self.roots.write();
                        Arc::clone(
                            roots
                                .entry(root_snapshot.key.clone())
                                .or_insert_with(|| Arc::clone(&built)),
                        )
                    };
                    if Arc::ptr_eq(&node, &built) {
                        self.index_subtree(&node);
                    } else {
                        self.merge_children(&node, root_snapshot);
                    }
                }
            }
        }
    }

    fn merge_children(&self, node: &Arc<AggregationNode>, snapshot: &NodeSnapshot) {
        for child_snapshot in &snapshot.children {
            match node.child(&child_snapshot.key) {
                Some(existing) => self.merge_children(&existing, child_snapshot),
                None => {
                    let built = AggregationNode::from_snapshot(child_snapshot, node.depth() + 1);
                    let adopted = node.adopt_child(Arc::clone(&built));
                    if Arc::ptr_eq(&adopted, &built) {
                        self.index_subtree(&adopted);
                    } else {
                        self.merge_children(&adopted, child_snapshot);
                    }
                }
            }
        }
    }

    fn index_subtree(&self, node: &Arc<AggregationNode>) {
        self.index_node(node);
        for child in node.children() {
            self.index_subtree(&child);
        }
    }
}
