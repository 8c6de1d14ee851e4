/*!
 * Global Registry
 * Process-wide active aggregation worker and the read-only query surface
 */

use crate::aggregation::factory::AggregationFactory;
use crate::aggregation::key::AggregationKey;
use crate::aggregation::node::AggregationNode;
use crate::aggregation::worker::AggregationWorker;
use crate::trace::identity::SpanIdentity;
use crate::trace::record::SpanRecord;
use arc_swap::ArcSwap;
use std::sync::{Arc, OnceLock};

static WORKER: OnceLock<ArcSwap<AggregationWorker>> = OnceLock::new();

fn cell() -> &'static ArcSwap<AggregationWorker> {
    WORKER.get_or_init(|| {
        let worker = Arc::new(AggregationWorker::bounded_async());
        worker.start();
        ArcSwap::from(worker)
    })
}

/// The active aggregation worker
///
/// A bounded-async worker with no factories is installed on first use, so
/// finished spans are consumed even before the application configures one.
pub fn aggregation_worker() -> Arc<AggregationWorker> {
    cell().load_full()
}

/// Install a new worker and shut down the one it replaces
///
/// The new worker is started if it was not already. In-flight drain passes
/// on the old worker finish before it stops.
pub fn set_aggregation_worker(worker: Arc<AggregationWorker>) {
    worker.start();
    let mut first_install = false;
    let cell = WORKER.get_or_init(|| {
        first_install = true;
        ArcSwap::from(Arc::clone(&worker))
    });
    if !first_install {
        let previous = cell.swap(worker);
        previous.shutdown();
    }
}

/// Queue a finished record on the active worker
pub(crate) fn aggregate_record(record: Arc<SpanRecord>) {
    aggregation_worker().aggregate(record);
}

/// Start the active worker, loading persisted state if it is configured
pub fn start() {
    aggregation_worker().start();
}

/// Persist and stop the active worker
///
/// Finished spans recorded afterwards are dropped until a replacement is
/// installed with [`set_aggregation_worker`].
pub fn shutdown() {
    aggregation_worker().shutdown();
}

// ============================================================================
// Query Surface
// ============================================================================

/// Registered factories in registration order
pub fn factories() -> Vec<Arc<AggregationFactory>> {
    aggregation_worker().factories()
}

pub fn factory(name: &str) -> Option<Arc<AggregationFactory>> {
    aggregation_worker().factory(name)
}

/// Root nodes of every factory's tree, grouped by factory name
pub fn aggregations() -> Vec<(String, Vec<Arc<AggregationNode>>)> {
    factories()
        .iter()
        .map(|factory| (factory.name().to_string(), factory.roots()))
        .collect()
}

/// Root nodes of one factory's tree
pub fn aggregations_by_factory(factory_name: &str) -> Vec<Arc<AggregationNode>> {
    factory(factory_name)
        .map(|factory| factory.roots())
        .unwrap_or_default()
}

/// Key-only lookup within one factory
pub fn aggregation(factory_name: &str, key: &AggregationKey) -> Option<Arc<AggregationNode>> {
    factory(factory_name)?.lookup(key)
}

/// Nodes matching a key across all factories, paired with the factory name
pub fn aggregations_for_key(key: &AggregationKey) -> Vec<(String, Arc<AggregationNode>)> {
    factories()
        .iter()
        .filter_map(|factory| {
            factory
                .lookup(key)
                .map(|node| (factory.name().to_string(), node))
        })
        .collect()
}

/// Nodes for a span's coordinates across all factories
///
/// Each factory resolves the key under its own strategy.
pub fn aggregations_for_span(
    identity: &SpanIdentity,
    name: &str,
) -> Vec<(String, Arc<AggregationNode>)> {
    factories()
        .iter()
        .filter_map(|factory| {
            factory
                .lookup_span(identity, name)
                .map(|node| (factory.name().to_string(), node))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::span::SpanStatus;
    use serial_test::serial;

    fn record(name: &str, tag: u8, duration: u64) -> Arc<SpanRecord> {
        Arc::new(SpanRecord {
            identity: SpanIdentity::from_bytes([tag; 16]),
            name: name.to_string(),
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

    #[test]
    #[serial]
    fn test_default_worker_consumes_records() {
        let worker = aggregation_worker();
        assert!(!worker.is_closed());
        aggregate_record(record("unconfigured", 1, 100));
    }

    #[test]
    #[serial]
    fn test_shutdown_closes_the_active_worker() {
        let worker = Arc::new(AggregationWorker::synchronous());
        set_aggregation_worker(Arc::clone(&worker));
        start();
        assert!(!worker.is_closed());

        shutdown();
        assert!(worker.is_closed());
        // dropped, not queued
        aggregate_record(record("late", 9, 10));

        let fresh = Arc::new(AggregationWorker::synchronous());
        set_aggregation_worker(Arc::clone(&fresh));
        assert!(!fresh.is_closed());
    }

    #[test]
    #[serial]
    fn test_swap_shuts_down_previous_worker() {
        let first = Arc::new(AggregationWorker::synchronous());
        set_aggregation_worker(Arc::clone(&first));
        assert!(!first.is_closed());

        let second = Arc::new(AggregationWorker::synchronous());
        set_aggregation_worker(Arc::clone(&second));
        assert!(first.is_closed());
        assert!(!second.is_closed());
    }

    #[test]
    #[serial]
    fn test_query_surface_reaches_factories() {
        let worker = Arc::new(AggregationWorker::synchronous());
        worker.add_factory(AggregationFactory::execution("registry-exec")).unwrap();
        worker.add_factory(AggregationFactory::top_spans("registry-tops")).unwrap();
        set_aggregation_worker(worker);

        aggregate_record(record("lookup-me", 7, 250));

        assert!(factory("registry-exec").is_some());
        assert!(factory("missing").is_none());
        assert_eq!(aggregations_by_factory("registry-exec").len(), 1);

        let all = aggregations();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, "registry-exec");
        assert_eq!(all[0].1.len(), 1);

        let identity = SpanIdentity::from_bytes([7; 16]);
        let by_identity = aggregation("registry-exec", &AggregationKey::Identity(identity));
        assert_eq!(by_identity.unwrap().measurements(), 1);

        let by_key = aggregations_for_key(&AggregationKey::Name("lookup-me".to_string()));
        assert_eq!(by_key.len(), 1);
        assert_eq!(by_key[0].0, "registry-tops");

        let by_span = aggregations_for_span(&identity, "lookup-me");
        assert_eq!(by_span.len(), 2);
    }
}
