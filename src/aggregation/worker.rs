/*!
 * Aggregation Worker
 * Queue of finished records with exchangeable drain strategies
 *
 * Producers never block: enqueue is a lock-free push plus, for the async
 * strategies, a non-blocking signal whose loss is harmless because any
 * scheduled pass drains the whole queue.
 */

use crate::aggregation::factory::AggregationFactory;
use crate::aggregation::persistence::{self, FactorySnapshot, PersistenceConfig};
use crate::core::errors::{AggregationError, AggregationResult};
use crate::core::limits::{DRAIN_SIGNAL_DEPTH, FACTORY_DISPATCH_DEPTH};
use crate::trace::record::SpanRecord;
use crossbeam_queue::SegQueue;
use parking_lot::{Mutex, RwLock};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// How queued records reach the factories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStrategy {
    /// Drain on the producer's thread before enqueue returns
    Synchronous,
    /// Single consumer thread woken through a bounded signal channel
    BoundedAsync,
    /// Async drain that hands each record to a dedicated thread per factory,
    /// so one slow factory cannot delay the others
    PerFactory,
}

enum Signal {
    Drain,
    Shutdown,
}

#[derive(Clone)]
struct FactorySlot {
    factory: Arc<AggregationFactory>,
    dispatch: Option<flume::Sender<Arc<SpanRecord>>>,
}

struct WorkerShared {
    queue: SegQueue<Arc<SpanRecord>>,
    slots: RwLock<Vec<FactorySlot>>,
    closed: AtomicBool,
}

/// Drain pipeline feeding finished records to every registered factory
pub struct AggregationWorker {
    strategy: DrainStrategy,
    shared: Arc<WorkerShared>,
    signal_tx: Option<flume::Sender<Signal>>,
    signal_rx: Mutex<Option<flume::Receiver<Signal>>>,
    persistence: Option<PersistenceConfig>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl AggregationWorker {
    pub fn new(strategy: DrainStrategy) -> Self {
        let (signal_tx, signal_rx) = match strategy {
            DrainStrategy::Synchronous => (None, None),
            DrainStrategy::BoundedAsync | DrainStrategy::PerFactory => {
                let (tx, rx) = flume::bounded(DRAIN_SIGNAL_DEPTH);
                (Some(tx), Some(rx))
            }
        };
        Self {
            strategy,
            shared: Arc::new(WorkerShared {
                queue: SegQueue::new(),
                slots: RwLock::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
            signal_tx,
            signal_rx: Mutex::new(signal_rx),
            persistence: None,
            threads: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn synchronous() -> Self {
        Self::new(DrainStrategy::Synchronous)
    }

    pub fn bounded_async() -> Self {
        Self::new(DrainStrategy::BoundedAsync)
    }

    pub fn per_factory() -> Self {
        Self::new(DrainStrategy::PerFactory)
    }

    /// Persist factory snapshots at shutdown and reload them at start
    pub fn with_persistence(mut self, config: PersistenceConfig) -> Self {
        self.persistence = Some(config);
        self
    }

    #[inline]
    pub fn strategy(&self) -> DrainStrategy {
        self.strategy
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Queued records not yet drained
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    // ========================================================================
    // Factories
    // ========================================================================

    /// Register a factory; names are unique per worker
    pub fn add_factory(
        &self,
        factory: AggregationFactory,
    ) -> AggregationResult<Arc<AggregationFactory>> {
        if self.is_closed() {
            return Err(AggregationError::WorkerClosed);
        }
        let factory = Arc::new(factory);
        let mut slots = self.shared.slots.write();
        if slots.iter().any(|slot| slot.factory.name() == factory.name()) {
            return Err(AggregationError::DuplicateFactory(factory.name().to_string()));
        }
        let dispatch = if self.strategy == DrainStrategy::PerFactory {
            let (tx, rx) = flume::bounded(FACTORY_DISPATCH_DEPTH);
            let worker_factory = Arc::clone(&factory);
            let handle = std::thread::spawn(move || factory_loop(worker_factory, rx));
            self.threads.lock().push(handle);
            Some(tx)
        } else {
            None
        };
        slots.push(FactorySlot {
            factory: Arc::clone(&factory),
            dispatch,
        });
        Ok(factory)
    }

    /// Registered factories in registration order
    pub fn factories(&self) -> Vec<Arc<AggregationFactory>> {
        self.shared
            .slots
            .read()
            .iter()
            .map(|slot| Arc::clone(&slot.factory))
            .collect()
    }

    pub fn factory(&self, name: &str) -> Option<Arc<AggregationFactory>> {
        self.shared
            .slots
            .read()
            .iter()
            .find(|slot| slot.factory.name() == name)
            .map(|slot| Arc::clone(&slot.factory))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load persisted snapshots and spawn the drain consumer
    ///
    /// Idempotent. A corrupt snapshot file is logged and treated as empty
    /// state; startup never fails because of it.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(config) = &self.persistence {
            match persistence::load(config) {
                Ok(snapshots) => self.import_snapshots(&snapshots),
                Err(err) => {
                    warn!(error = %err, "failed to load aggregation snapshots; starting empty")
                }
            }
        }
        if let Some(rx) = self.signal_rx.lock().take() {
            let shared = Arc::clone(&self.shared);
            let handle = std::thread::spawn(move || consumer_loop(shared, rx));
            self.threads.lock().push(handle);
        }
    }

    fn import_snapshots(&self, snapshots: &[FactorySnapshot]) {
        for snapshot in snapshots {
            match self.factory(&snapshot.factory) {
                Some(factory) => factory.import(snapshot),
                None => {
                    debug!(factory = %snapshot.factory, "snapshot for unregistered factory ignored")
                }
            }
        }
    }

    /// Enqueue a finished record and schedule a drain
    pub fn aggregate(&self, record: Arc<SpanRecord>) {
        if self.is_closed() {
            debug!(span = %record.name, "worker closed; record dropped");
            return;
        }
        self.shared.queue.push(record);
        match self.strategy {
            DrainStrategy::Synchronous => drain_queue(&self.shared),
            DrainStrategy::BoundedAsync | DrainStrategy::PerFactory => {
                if let Some(tx) = &self.signal_tx {
                    // a full channel means a pass is already scheduled; that
                    // pass will drain this record
                    let _ = tx.try_send(Signal::Drain);
                }
            }
        }
    }

    /// Drain the queue on the calling thread
    pub fn drain_now(&self) {
        drain_queue(&self.shared);
    }

    /// Stop accepting records, flush the queue, join threads, and persist
    ///
    /// Idempotent. Records enqueued after shutdown are dropped with a debug
    /// log.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.closed.store(true, Ordering::Release);
        drain_queue(&self.shared);
        if let Some(tx) = &self.signal_tx {
            let _ = tx.send(Signal::Shutdown);
        }
        {
            // closing the dispatch channels ends the factory threads
            let mut slots = self.shared.slots.write();
            for slot in slots.iter_mut() {
                slot.dispatch = None;
            }
        }
        let threads = std::mem::take(&mut *self.threads.lock());
        for handle in threads {
            let _ = handle.join();
        }
        self.persist();
        debug!(strategy = ?self.strategy, "aggregation worker stopped");
    }

    fn persist(&self) {
        let Some(config) = &self.persistence else {
            return;
        };
        let snapshots: Vec<FactorySnapshot> = self
            .factories()
            .iter()
            .map(|factory| factory.to_snapshot())
            .collect();
        if let Err(err) = persistence::save(config, &snapshots) {
            warn!(error = %err, "failed to persist aggregation snapshots");
        }
    }
}

// ============================================================================
// Drain Paths
// ============================================================================

fn consumer_loop(shared: Arc<WorkerShared>, rx: flume::Receiver<Signal>) {
    while let Ok(signal) = rx.recv() {
        match signal {
            Signal::Drain => drain_queue(&shared),
            Signal::Shutdown => {
                drain_queue(&shared);
                break;
            }
        }
    }
}

fn factory_loop(factory: Arc<AggregationFactory>, rx: flume::Receiver<Arc<SpanRecord>>) {
    while let Ok(record) = rx.recv() {
        aggregate_into(&factory, &record);
    }
}

fn drain_queue(shared: &WorkerShared) {
    let slots = shared.slots.read().clone();
    while let Some(record) = shared.queue.pop() {
        for slot in &slots {
            match &slot.dispatch {
                None => aggregate_into(&slot.factory, &record),
                Some(tx) => match tx.try_send(Arc::clone(&record)) {
                    Ok(()) => {}
                    Err(flume::TrySendError::Full(_)) => warn!(
                        factory = %slot.factory.name(),
                        span = %record.name,
                        "factory busy; record skipped"
                    ),
                    Err(flume::TrySendError::Disconnected(_)) => warn!(
                        factory = %slot.factory.name(),
                        span = %record.name,
                        "factory thread gone; record skipped"
                    ),
                },
            }
        }
    }
}

/// One factory's failure never reaches the producer or other factories
fn aggregate_into(factory: &Arc<AggregationFactory>, record: &Arc<SpanRecord>) {
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| factory.aggregate(record)));
    if outcome.is_err() {
        warn!(
            factory = %factory.name(),
            span = %record.name,
            "aggregation failed; record skipped for this factory"
        );
    }
}
