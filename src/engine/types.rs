//! Public types for the comment engine coordinator.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::EngineError;
use crate::forest::CommentForest;
use crate::node::{MutationId, NodeId};

/// Completion signal for one dispatched mutation.
///
/// Dispatch returns immediately with the optimistic result; the handle
/// resolves once the server round-trip settled (confirmed, idempotent, or
/// rolled back). Errors never cross any other boundary.
#[derive(Debug)]
pub struct MutationHandle {
    mutation_id: MutationId,
    completion: oneshot::Receiver<Result<(), EngineError>>,
}

impl MutationHandle {
    pub(super) fn new(
        mutation_id: MutationId,
        completion: oneshot::Receiver<Result<(), EngineError>>,
    ) -> Self {
        Self {
            mutation_id,
            completion,
        }
    }

    #[must_use]
    pub fn mutation_id(&self) -> MutationId {
        self.mutation_id
    }

    /// Wait for the mutation to settle.
    pub async fn settled(self) -> Result<(), EngineError> {
        match self.completion.await {
            Ok(result) => result,
            Err(_) => Err(EngineError::fatal("completion signal dropped")),
        }
    }
}

/// Immediate result of a dispatch: the optimistic forest plus the handle.
#[derive(Debug)]
pub struct DispatchAck {
    pub mutation_id: MutationId,
    /// Forest snapshot with the provisional update already applied.
    pub forest: Arc<CommentForest>,
    /// Temporary id of the inserted node, for creations.
    pub provisional_id: Option<NodeId>,
    pub handle: MutationHandle,
}

/// Read-only view of one partition for a render frame.
///
/// The forest is an immutable snapshot; `collapsed` carries the collapse
/// flags of exactly the nodes present in it. Callers may hold this across
/// frames without blocking writers.
#[derive(Debug, Clone)]
pub struct ForestSnapshot {
    pub forest: Arc<CommentForest>,
    pub revision: u64,
    collapsed: HashSet<NodeId>,
}

impl ForestSnapshot {
    pub(super) fn new(
        forest: Arc<CommentForest>,
        revision: u64,
        collapsed: HashSet<NodeId>,
    ) -> Self {
        Self {
            forest,
            revision,
            collapsed,
        }
    }

    #[must_use]
    pub fn is_collapsed(&self, id: &NodeId) -> bool {
        self.collapsed.contains(id)
    }
}

/// Point-in-time engine counters, suitable for diagnostics endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub partitions: usize,
    pub pending_mutations: usize,
    pub view_entries: usize,
}
