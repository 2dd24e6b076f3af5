// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Partitioned forest cache.
//!
//! One [`Partition`] per [`PartitionKey`] holds the current immutable forest
//! snapshot plus a revision counter published on a watch channel, so
//! presentation layers can await "something changed" without polling the
//! tree itself. Readers always receive an [`Arc`] snapshot and can hold it
//! across a render frame; writers replace the snapshot atomically under the
//! partition's map entry.
//!
//! The cache is bounded: beyond `max_partitions`, least-recently-accessed
//! partitions are evicted. A reconciliation that arrives after its partition
//! was evicted is dropped by the caller as a benign race.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;

use crate::forest::{CommentForest, TreeOutcome};
use crate::node::{MutationId, NodeId};
use crate::partition::{PartitionKey, ViewerId};

struct Partition {
    forest: Arc<CommentForest>,
    revision: u64,
    changes: watch::Sender<u64>,
    last_accessed: u64,
}

impl Partition {
    fn new(forest: Arc<CommentForest>, tick: u64) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            forest,
            revision: 0,
            changes,
            last_accessed: tick,
        }
    }

    fn bump(&mut self) {
        self.revision += 1;
        self.changes.send_replace(self.revision);
    }
}

/// Concurrent cache of comment forests, one partition per key.
pub struct TreeStore {
    partitions: DashMap<PartitionKey, Partition>,
    clock: AtomicU64,
    max_partitions: usize,
}

impl TreeStore {
    #[must_use]
    pub fn new(max_partitions: usize) -> Self {
        Self {
            partitions: DashMap::new(),
            clock: AtomicU64::new(0),
            max_partitions,
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Current snapshot for a key, touching its access clock.
    #[must_use]
    pub fn get(&self, key: &PartitionKey) -> Option<Arc<CommentForest>> {
        let mut partition = self.partitions.get_mut(key)?;
        partition.last_accessed = self.tick();
        Some(Arc::clone(&partition.forest))
    }

    #[must_use]
    pub fn contains(&self, key: &PartitionKey) -> bool {
        self.partitions.contains_key(key)
    }

    /// Current revision for a key.
    #[must_use]
    pub fn revision(&self, key: &PartitionKey) -> Option<u64> {
        self.partitions.get(key).map(|p| p.revision)
    }

    /// Replace a partition wholesale (initial fetch or refetch).
    pub fn set(&self, key: PartitionKey, forest: CommentForest) -> Arc<CommentForest> {
        let forest = Arc::new(forest);
        let tick = self.tick();
        match self.partitions.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let partition = occupied.get_mut();
                partition.forest = Arc::clone(&forest);
                partition.last_accessed = tick;
                partition.bump();
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Partition::new(Arc::clone(&forest), tick));
            }
        }
        self.maybe_evict();
        forest
    }

    /// Apply a fallible transformation to a partition's forest.
    ///
    /// The closure runs under the partition's entry lock, so it always sees
    /// the current snapshot and its replacement is atomic; it must not call
    /// back into the store. Returns `None` if the partition does not exist.
    pub fn mutate<T, E>(
        &self,
        key: &PartitionKey,
        f: impl FnOnce(&CommentForest) -> Result<(CommentForest, T), E>,
    ) -> Option<Result<(Arc<CommentForest>, T), E>> {
        let mut partition = self.partitions.get_mut(key)?;
        partition.last_accessed = self.tick();
        match f(&partition.forest) {
            Ok((forest, value)) => {
                let forest = Arc::new(forest);
                partition.forest = Arc::clone(&forest);
                partition.bump();
                Some(Ok((forest, value)))
            }
            Err(err) => Some(Err(err)),
        }
    }

    /// Infallible [`mutate`](Self::mutate) for tree edits that report a
    /// [`TreeOutcome`]. Misses leave the snapshot and revision untouched.
    pub fn update(
        &self,
        key: &PartitionKey,
        f: impl FnOnce(&CommentForest) -> (CommentForest, TreeOutcome),
    ) -> Option<(Arc<CommentForest>, TreeOutcome)> {
        let mut partition = self.partitions.get_mut(key)?;
        partition.last_accessed = self.tick();
        let (forest, outcome) = f(&partition.forest);
        if outcome.is_applied() {
            let forest = Arc::new(forest);
            partition.forest = Arc::clone(&forest);
            partition.bump();
            Some((forest, outcome))
        } else {
            Some((Arc::clone(&partition.forest), outcome))
        }
    }

    /// Watch revision ticks for a key.
    #[must_use]
    pub fn changes(&self, key: &PartitionKey) -> Option<watch::Receiver<u64>> {
        self.partitions.get(key).map(|p| p.changes.subscribe())
    }

    /// Drop a partition. Returns whether it existed.
    pub fn evict(&self, key: &PartitionKey) -> bool {
        let evicted = self.partitions.remove(key).is_some();
        if evicted {
            crate::metrics::record_partition_eviction(1);
        }
        evicted
    }

    /// Drop every partition belonging to a viewer (logout).
    pub fn invalidate_viewer(&self, viewer: &ViewerId) -> usize {
        let victims: Vec<PartitionKey> = self
            .partitions
            .iter()
            .filter(|entry| entry.key().viewer == *viewer)
            .map(|entry| entry.key().clone())
            .collect();
        for key in &victims {
            self.partitions.remove(key);
        }
        if !victims.is_empty() {
            crate::metrics::record_partition_eviction(victims.len());
            debug!(viewer = %viewer, evicted = victims.len(), "invalidated viewer partitions");
        }
        victims.len()
    }

    /// Find the partition currently holding a node id.
    ///
    /// Used when a reconciliation arrives after a sort-mode switch: the
    /// mutation's own partition may be gone, but the node id is sort-mode
    /// independent and may live in another partition now.
    #[must_use]
    pub fn locate_node(&self, id: &NodeId) -> Option<PartitionKey> {
        self.partitions
            .iter()
            .find(|entry| entry.value().forest.contains(id))
            .map(|entry| entry.key().clone())
    }

    /// Find the partition currently holding a provisional marker.
    #[must_use]
    pub fn locate_marker(&self, mutation_id: &MutationId) -> Option<PartitionKey> {
        self.partitions
            .iter()
            .find(|entry| entry.value().forest.find_by_marker(mutation_id).is_some())
            .map(|entry| entry.key().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    fn maybe_evict(&self) {
        let over = self.partitions.len().saturating_sub(self.max_partitions);
        if over == 0 {
            return;
        }

        let mut entries: Vec<(PartitionKey, u64)> = self
            .partitions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().last_accessed))
            .collect();
        entries.sort_by_key(|(_, accessed)| *accessed);

        for (key, _) in entries.into_iter().take(over) {
            self.partitions.remove(&key);
            debug!(key = %key, "evicted least-recently-used partition");
        }
        crate::metrics::record_partition_eviction(over);
    }
}
