/*!
 * Aggregation Module
 * Key strategies, statistics trees, drain workers, and snapshot persistence
 */

pub mod factory;
pub mod key;
pub mod node;
pub mod persistence;
pub mod stats;
pub mod worker;

pub use factory::AggregationFactory;
pub use key::{AggregationKey, KeyStrategy};
pub use node::AggregationNode;
pub use persistence::{FactorySnapshot, NodeSnapshot, PersistenceConfig};
pub use stats::{AggregateStats, ExecutionStats, RankedEntry, RankedSet, StatsKind};
pub use worker::{AggregationWorker, DrainStrategy};
