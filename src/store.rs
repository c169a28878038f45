//! Region-partitioned reading store
//!
//! One append-only sequence per region, each behind its own lock:
//!
//! ```text
//!  append(norte) ──► [RwLock<Vec<Arc<Reading>>>]  norte
//!  append(sul)   ──► [RwLock<Vec<Arc<Reading>>>]  sul
//!                    [RwLock<Vec<Arc<Reading>>>]  leste
//!                    [RwLock<Vec<Arc<Reading>>>]  oeste
//!                                 │
//!                     snapshot_*  ▼  clones Arc handles only
//! ```
//!
//! Writers to different regions never contend. A snapshot holds a region's
//! read lock only long enough to clone its `Arc` list, so renderers never
//! block ingestion for the duration of an aggregation. Readings are never
//! mutated or removed.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{Reading, Region};

/// Concurrent, append-only store of readings keyed by region
#[derive(Debug)]
pub struct ReadingStore {
    partitions: [RwLock<Vec<Arc<Reading>>>; Region::COUNT],
}

impl Default for ReadingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadingStore {
    /// Create a store with every region pre-initialized empty
    pub fn new() -> Self {
        Self {
            partitions: std::array::from_fn(|_| RwLock::new(Vec::new())),
        }
    }

    fn partition(&self, region: Region) -> &RwLock<Vec<Arc<Reading>>> {
        &self.partitions[region.index()]
    }

    /// Append a reading to its region, returning the shared handle
    pub fn append(&self, reading: Reading) -> Arc<Reading> {
        let shared = Arc::new(reading);
        self.append_shared(Arc::clone(&shared));
        shared
    }

    /// Append an already shared reading
    pub fn append_shared(&self, reading: Arc<Reading>) {
        self.partition(reading.region()).write().push(reading);
    }

    /// All readings, regions in `Region::ALL` order, arrival order within each
    pub fn snapshot_all(&self) -> Vec<Arc<Reading>> {
        let mut out = Vec::with_capacity(self.count_all());
        for region in Region::ALL {
            out.extend(self.partition(region).read().iter().cloned());
        }
        out
    }

    /// Readings of one region in arrival order
    pub fn snapshot_region(&self, region: Region) -> Vec<Arc<Reading>> {
        self.partition(region).read().clone()
    }

    /// Total number of readings across all regions
    pub fn count_all(&self) -> usize {
        self.partitions.iter().map(|p| p.read().len()).sum()
    }

    /// Number of readings for one region
    pub fn count_region(&self, region: Region) -> usize {
        self.partition(region).read().len()
    }

    /// Per-region counts in `Region::ALL` order
    pub fn counts(&self) -> [(Region, usize); Region::COUNT] {
        Region::ALL.map(|r| (r, self.count_region(r)))
    }

    /// True when nothing has been stored yet
    pub fn is_empty(&self) -> bool {
        self.count_all() == 0
    }
}
