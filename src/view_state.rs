// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Collapse/expand side table.
//!
//! Collapse state is keyed by node id, not by forest snapshot: node ids are
//! stable across refetches and sort switches, so a collapsed thread stays
//! collapsed when its partition is replaced wholesale. Entries for ids that
//! never reappear become inert; the table is bounded and sweeps its
//! oldest-touched entries rather than growing for the whole session.
//!
//! Only collapsed nodes are stored. Expansion is the default, so expanding a
//! node removes its entry, which also makes [`ViewStateStore::force_expand`]
//! naturally idempotent.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::node::NodeId;

struct ViewEntry {
    /// Monotonic touch tick, for the oldest-first sweep.
    touched: u64,
}

/// Per-node collapse flags, independent of any forest snapshot.
pub struct ViewStateStore {
    collapsed: DashMap<NodeId, ViewEntry>,
    clock: AtomicU64,
    max_entries: usize,
}

impl ViewStateStore {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            collapsed: DashMap::new(),
            clock: AtomicU64::new(0),
            max_entries,
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Default is expanded.
    #[must_use]
    pub fn is_collapsed(&self, id: &NodeId) -> bool {
        if let Some(mut entry) = self.collapsed.get_mut(id) {
            entry.touched = self.tick();
            true
        } else {
            false
        }
    }

    /// Flip the flag; returns the new state.
    pub fn toggle(&self, id: &NodeId) -> bool {
        if self.collapsed.remove(id).is_some() {
            false
        } else {
            self.insert_collapsed(id.clone());
            true
        }
    }

    pub fn set_collapsed(&self, id: &NodeId, collapsed: bool) {
        if collapsed {
            if let Some(mut entry) = self.collapsed.get_mut(id) {
                entry.touched = self.tick();
            } else {
                self.insert_collapsed(id.clone());
            }
        } else {
            self.collapsed.remove(id);
        }
    }

    /// Idempotent expansion. Used when a reply lands under a collapsed
    /// ancestor so the new node is visible without manual expansion.
    pub fn force_expand(&self, id: &NodeId) {
        self.collapsed.remove(id);
    }

    /// Number of collapsed entries currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collapsed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collapsed.is_empty()
    }

    fn insert_collapsed(&self, id: NodeId) {
        let touched = self.tick();
        self.collapsed.insert(id, ViewEntry { touched });
        if self.collapsed.len() > self.max_entries {
            self.sweep();
        }
    }

    /// Drop the oldest-touched eighth of the table.
    fn sweep(&self) {
        let mut entries: Vec<(NodeId, u64)> = self
            .collapsed
            .iter()
            .map(|e| (e.key().clone(), e.value().touched))
            .collect();
        entries.sort_by_key(|(_, touched)| *touched);

        let drop_count = (entries.len() / 8).max(1);
        for (id, _) in entries.into_iter().take(drop_count) {
            self.collapsed.remove(&id);
        }
        tracing::debug!(dropped = drop_count, "swept collapse-state entries");
    }
}
