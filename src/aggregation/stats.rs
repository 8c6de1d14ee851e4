/*!
 * Aggregate Statistics
 * Tagged statistics payloads: running execution stats and bounded rankings
 */

use crate::trace::record::SpanRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

// ============================================================================
// Execution Statistics
// ============================================================================

/// Running min/max/count/total over span durations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub measurements: u64,
    pub total_nanos: u64,
    pub min_nanos: u64,
    pub max_nanos: u64,
}

impl ExecutionStats {
    pub fn record(&mut self, duration_nanos: u64) {
        if self.measurements == 0 {
            self.min_nanos = duration_nanos;
            self.max_nanos = duration_nanos;
        } else {
            self.min_nanos = self.min_nanos.min(duration_nanos);
            self.max_nanos = self.max_nanos.max(duration_nanos);
        }
        self.measurements += 1;
        self.total_nanos += duration_nanos;
    }

    /// Mean duration; zero when nothing was measured
    #[inline]
    pub fn mean_nanos(&self) -> u64 {
        if self.measurements == 0 {
            0
        } else {
            self.total_nanos / self.measurements
        }
    }
}

// ============================================================================
// Ranked Sets
// ============================================================================

/// One ranked record with its ranking value frozen at insert time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedEntry {
    pub record: Arc<SpanRecord>,
    pub rank_nanos: i64,
    seq: u64,
}

impl Ord for RankedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // larger rank first; equal ranks prefer the later start; the
        // sequence number keeps same-valued entries distinct
        other
            .rank_nanos
            .cmp(&self.rank_nanos)
            .then_with(|| other.record.start_millis.cmp(&self.record.start_millis))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for RankedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RankedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankedEntry {}

/// Bounded set of records ordered best-first by rank
///
/// Overflow evicts the worst entry: smallest rank, earliest start among
/// equals. Entries with identical rank and start are all retained up to the
/// capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSet {
    capacity: usize,
    next_seq: u64,
    entries: BTreeSet<RankedEntry>,
}

impl RankedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_seq: 0,
            entries: BTreeSet::new(),
        }
    }

    pub fn insert(&mut self, record: Arc<SpanRecord>, rank_nanos: i64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(RankedEntry {
            record,
            rank_nanos,
            seq,
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_last();
        }
    }

    /// Records best-first
    pub fn records(&self) -> Vec<Arc<SpanRecord>> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(&entry.record))
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &RankedEntry> {
        self.entries.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ============================================================================
// Tagged Payload
// ============================================================================

/// Which statistics payload a factory accumulates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatsKind {
    Execution,
    TopSpans { capacity: usize },
    Hotspot { capacity: usize },
}

impl StatsKind {
    pub(crate) fn empty_stats(&self) -> AggregateStats {
        match self {
            StatsKind::Execution => AggregateStats::Execution(ExecutionStats::default()),
            StatsKind::TopSpans { capacity } => AggregateStats::TopSpans(RankedSet::new(*capacity)),
            StatsKind::Hotspot { capacity } => AggregateStats::Hotspot(RankedSet::new(*capacity)),
        }
    }
}

/// Statistics accumulated by one aggregation node
///
/// Top-span rankings order by total duration; hotspot rankings order by own
/// duration, surfacing spans that spend time outside their children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateStats {
    Execution(ExecutionStats),
    TopSpans(RankedSet),
    Hotspot(RankedSet),
}

impl AggregateStats {
    pub fn record(&mut self, record: &Arc<SpanRecord>) {
        match self {
            AggregateStats::Execution(stats) => stats.record(record.duration_nanos),
            AggregateStats::TopSpans(set) => {
                set.insert(Arc::clone(record), record.duration_nanos as i64)
            }
            AggregateStats::Hotspot(set) => {
                set.insert(Arc::clone(record), record.own_duration_nanos)
            }
        }
    }

    /// Measurement count for execution stats, retained entries for rankings
    pub fn measurements(&self) -> u64 {
        match self {
            AggregateStats::Execution(stats) => stats.measurements,
            AggregateStats::TopSpans(set) | AggregateStats::Hotspot(set) => set.len() as u64,
        }
    }

    pub fn execution(&self) -> Option<&ExecutionStats> {
        match self {
            AggregateStats::Execution(stats) => Some(stats),
            _ => None,
        }
    }

    pub fn ranked(&self) -> Option<&RankedSet> {
        match self {
            AggregateStats::TopSpans(set) | AggregateStats::Hotspot(set) => Some(set),
            AggregateStats::Execution(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::identity::SpanIdentity;
    use crate::trace::span::SpanStatus;

    fn record(name: &str, duration: u64, own: i64, start: u64) -> Arc<SpanRecord> {
        Arc::new(SpanRecord {
            identity: SpanIdentity::from_bytes([name.len() as u8; 16]),
            name: name.to_string(),
            status: SpanStatus::Stopped,
            start_millis: start,
            duration_nanos: duration,
            own_duration_nanos: own,
            depth: 1,
            lineage: Vec::new(),
            context: Vec::new(),
            debug_lines: Vec::new(),
            abort: None,
            foreign: false,
        })
    }

    #[test]
    fn test_execution_stats_running_values() {
        let mut stats = ExecutionStats::default();
        for nanos in [300, 100, 200] {
            stats.record(nanos);
        }
        assert_eq!(stats.measurements, 3);
        assert_eq!(stats.total_nanos, 600);
        assert_eq!(stats.min_nanos, 100);
        assert_eq!(stats.max_nanos, 300);
        assert_eq!(stats.mean_nanos(), 200);
    }

    #[test]
    fn test_empty_execution_stats_mean_is_zero() {
        assert_eq!(ExecutionStats::default().mean_nanos(), 0);
    }

    #[test]
    fn test_ranked_set_keeps_largest_k() {
        let mut set = RankedSet::new(3);
        for duration in [50, 400, 100, 300, 200] {
            set.insert(record("work", duration, duration as i64, 1), duration as i64);
        }
        assert_eq!(set.len(), 3);
        let durations: Vec<u64> = set.records().iter().map(|r| r.duration_nanos).collect();
        assert_eq!(durations, vec![400, 300, 200]);
    }

    #[test]
    fn test_ranked_tie_prefers_later_start() {
        let mut set = RankedSet::new(1);
        set.insert(record("early", 100, 100, 10), 100);
        set.insert(record("late", 100, 100, 20), 100);

        let kept = set.records();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "late");
    }

    #[test]
    fn test_identical_entries_all_retained() {
        let mut set = RankedSet::new(5);
        for _ in 0..3 {
            set.insert(record("same", 100, 100, 10), 100);
        }
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_hotspot_ranks_by_own_duration() {
        let kind = StatsKind::Hotspot { capacity: 2 };
        let mut stats = kind.empty_stats();
        // large total but tiny own time loses to small total with large own time
        stats.record(&record("wrapper", 1000, 10, 1));
        stats.record(&record("leaf-a", 500, 500, 2));
        stats.record(&record("leaf-b", 300, 300, 3));

        let names: Vec<String> = stats
            .ranked()
            .unwrap()
            .records()
            .iter()
            .map(|r| r.name.clone())
            .collect();
        assert_eq!(names, vec!["leaf-a".to_string(), "leaf-b".to_string()]);
    }

    #[test]
    fn test_top_spans_rank_by_total_duration() {
        let kind = StatsKind::TopSpans { capacity: 2 };
        let mut stats = kind.empty_stats();
        stats.record(&record("wrapper", 1000, 10, 1));
        stats.record(&record("leaf-a", 500, 500, 2));
        stats.record(&record("leaf-b", 300, 300, 3));

        let names: Vec<String> = stats
            .ranked()
            .unwrap()
            .records()
            .iter()
            .map(|r| r.name.clone())
            .collect();
        assert_eq!(names, vec!["wrapper".to_string(), "leaf-a".to_string()]);
    }

    #[test]
    fn test_ranked_set_serde_round_trip() {
        let mut set = RankedSet::new(4);
        for (duration, start) in [(100, 1), (300, 2), (200, 3)] {
            set.insert(record("wire", duration, duration as i64, start), duration as i64);
        }
        let stats = AggregateStats::TopSpans(set);

        let bytes = crate::core::codec::to_vec(&stats).unwrap();
        let decoded: AggregateStats = crate::core::codec::from_slice(&bytes).unwrap();
        assert_eq!(decoded, stats);

        let durations: Vec<u64> = decoded
            .ranked()
            .unwrap()
            .records()
            .iter()
            .map(|r| r.duration_nanos)
            .collect();
        assert_eq!(durations, vec![300, 200, 100]);
    }
}
