/*!
 * Aggregation Persistence
 * Snapshot layout and file I/O for carrying trees across restarts
 */

use crate::aggregation::key::AggregationKey;
use crate::aggregation::stats::AggregateStats;
use crate::core::codec;
use crate::core::errors::PersistenceResult;
use crate::core::limits::DEFAULT_SNAPSHOT_FILE;
use crate::trace::identity::SpanIdentity;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Where aggregation snapshots are written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub directory: PathBuf,
    pub file_name: String,
}

impl PersistenceConfig {
    pub fn new(directory: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            file_name: file_name.into(),
        }
    }

    /// Configuration with the default snapshot file name
    pub fn in_directory(directory: impl Into<PathBuf>) -> Self {
        Self::new(directory, DEFAULT_SNAPSHOT_FILE)
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

// ============================================================================
// Snapshot Layout
// ============================================================================

/// Persisted form of one aggregation subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub key: AggregationKey,
    pub span_name: String,
    pub span_identity: SpanIdentity,
    pub stats: AggregateStats,
    pub children: Vec<NodeSnapshot>,
}

/// Persisted form of one factory's roots, matched back by factory name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorySnapshot {
    pub factory: String,
    pub roots: Vec<NodeSnapshot>,
}

// ============================================================================
// File I/O
// ============================================================================

/// Write all factory snapshots to the configured file
pub fn save(config: &PersistenceConfig, snapshots: &[FactorySnapshot]) -> PersistenceResult<()> {
    fs::create_dir_all(&config.directory)?;
    let bytes = codec::to_vec(snapshots)?;
    let path = config.path();
    fs::write(&path, bytes)?;
    debug!(
        path = %path.display(),
        factories = snapshots.len(),
        "persisted aggregation snapshots"
    );
    Ok(())
}

/// Read factory snapshots from the configured file
///
/// A missing file is an empty state, not an error. A corrupt or unreadable
/// file surfaces as an error for the caller to log and discard.
pub fn load(config: &PersistenceConfig) -> PersistenceResult<Vec<FactorySnapshot>> {
    let path = config.path();
    if !path.exists() {
        info!(path = %path.display(), "no aggregation snapshot; starting empty");
        return Ok(Vec::new());
    }
    let bytes = fs::read(&path)?;
    let snapshots: Vec<FactorySnapshot> = codec::from_slice(&bytes)?;
    debug!(
        path = %path.display(),
        factories = snapshots.len(),
        "loaded aggregation snapshots"
    );
    Ok(snapshots)
}
