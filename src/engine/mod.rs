// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Comment engine coordinator.
//!
//! The [`CommentEngine`] is the main orchestrator that ties together all
//! components:
//! - Partitioned forest cache with LRU eviction
//! - Pending-mutation ledger (one in-flight mutation per node)
//! - Provisional synthesis and server reconciliation
//! - Collapse-state side table
//!
//! # Dispatch lifecycle
//!
//! ```text
//! dispatch(request)
//!   ├─ validate                      (nothing mutated on rejection)
//!   ├─ reserve pending guard         (ConflictPending if node busy)
//!   ├─ synthesize provisional forest (pure, under the partition lock)
//!   ├─ return DispatchAck            (optimistic snapshot + handle)
//!   └─ spawned task:
//!        ├─ call network collaborator
//!        ├─ reconcile result into the CURRENT forest   (success)
//!        │    or apply targeted rollback               (failure)
//!        └─ release guard, resolve completion signal
//! ```
//!
//! # Thread Safety
//!
//! The engine is `Send + Sync` and shared via [`Arc`]. Presentation layers
//! are readers only: every returned forest is an immutable snapshot.

mod types;

pub use types::{DispatchAck, EngineStats, ForestSnapshot, MutationHandle};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::CommentEngineConfig;
use crate::error::EngineError;
use crate::forest::CommentForest;
use crate::mutation::{synthesize, GuardKey, MutationRequest, PendingLedger, PendingMutation};
use crate::node::{CommentNode, MutationId, NodeId};
use crate::partition::{PartitionKey, ViewerId};
use crate::reconcile::{self, ServerOutcome};
use crate::remote::traits::{CommentBackend, RemoteError};
use crate::store::TreeStore;
use crate::view_state::ViewStateStore;

/// Main comment engine coordinator.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use comment_sync::{
///     CommentEngine, CommentEngineConfig, MutationRequest, PartitionKey,
///     SortMode, TargetType, ViewerId,
/// };
/// use comment_sync::remote::mock::MockBackend;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), comment_sync::EngineError> {
/// let engine = Arc::new(CommentEngine::new(
///     CommentEngineConfig::default(),
///     Arc::new(MockBackend::new()),
/// ));
///
/// let key = PartitionKey::new(TargetType::Post, "p1", SortMode::Newest, ViewerId::new("v1"));
/// engine.load(&key).await?;
///
/// let ack = engine.dispatch(MutationRequest::Create {
///     key: key.clone(),
///     parent: None,
///     author: comment_sync::AuthorRef::new("v1", "Viewer"),
///     content: "first!".into(),
/// })?;
/// // Optimistic forest is available immediately...
/// assert_eq!(ack.forest.len(), 1);
/// // ...and the handle resolves once the server round-trip settles.
/// ack.handle.settled().await?;
/// # Ok(())
/// # }
/// ```
pub struct CommentEngine {
    config: CommentEngineConfig,
    backend: Arc<dyn CommentBackend>,
    store: TreeStore,
    view: ViewStateStore,
    ledger: PendingLedger,
}

impl CommentEngine {
    #[must_use]
    pub fn new(config: CommentEngineConfig, backend: Arc<dyn CommentBackend>) -> Self {
        let store = TreeStore::new(config.max_partitions);
        let view = ViewStateStore::new(config.max_view_entries);
        Self {
            config,
            backend,
            store,
            view,
            ledger: PendingLedger::new(),
        }
    }

    // --- Partition lifecycle ---

    /// Fetch the forest for a key and replace its partition wholesale.
    ///
    /// Collapse state is untouched: it is keyed by node id, so nodes that
    /// reappear in the fresh forest keep their flags.
    #[tracing::instrument(skip(self), fields(key = %key))]
    pub async fn load(&self, key: &PartitionKey) -> Result<Arc<CommentForest>, EngineError> {
        let start = Instant::now();
        if key.viewer.is_empty() {
            return Err(EngineError::validation("missing viewer identity"));
        }

        match self
            .backend
            .fetch_forest(key.target_type, &key.target_id, key.sort)
            .await
        {
            Ok(nodes) => {
                let forest = self.store.set(key.clone(), CommentForest::new(nodes));
                crate::metrics::record_fetch("success");
                crate::metrics::record_fetch_latency(start.elapsed());
                crate::metrics::set_partitions(self.store.len());
                debug!(roots = forest.len(), "forest loaded");
                Ok(forest)
            }
            Err(err) => {
                crate::metrics::record_fetch("error");
                warn!(error = %err, "forest fetch failed");
                Err(classify_remote(err))
            }
        }
    }

    /// Current snapshot of a partition plus the collapse flags of its nodes.
    #[must_use]
    pub fn snapshot(&self, key: &PartitionKey) -> Option<ForestSnapshot> {
        let forest = self.store.get(key)?;
        let revision = self.store.revision(key).unwrap_or(0);
        let mut collapsed = HashSet::new();
        self.collect_collapsed(&forest.roots, &mut collapsed);
        Some(ForestSnapshot::new(forest, revision, collapsed))
    }

    /// Watch revision ticks for a partition.
    #[must_use]
    pub fn changes(&self, key: &PartitionKey) -> Option<watch::Receiver<u64>> {
        self.store.changes(key)
    }

    /// Drop a partition. In-flight mutations against it settle against the
    /// network as usual; their reconciliation becomes a benign no-op.
    pub fn evict(&self, key: &PartitionKey) -> bool {
        let evicted = self.store.evict(key);
        crate::metrics::set_partitions(self.store.len());
        evicted
    }

    /// Drop every partition of a viewer (logout). Like flags are
    /// viewer-relative, so none of these partitions may survive a viewer
    /// switch.
    pub fn invalidate_viewer(&self, viewer: &ViewerId) -> usize {
        let evicted = self.store.invalidate_viewer(viewer);
        crate::metrics::set_partitions(self.store.len());
        evicted
    }

    // --- Mutation dispatch ---

    /// Dispatch an optimistic mutation.
    ///
    /// Returns immediately with the provisionally-updated forest and a
    /// completion handle; the server round-trip and reconciliation run on a
    /// background task. Rejections (`Validation`, `ConflictPending`) happen
    /// synchronously, before anything is mutated.
    #[tracing::instrument(skip(self, request), fields(kind = %request.kind(), key = %request.key()))]
    pub fn dispatch(
        self: &Arc<Self>,
        request: MutationRequest,
    ) -> Result<DispatchAck, EngineError> {
        let started = Instant::now();
        let kind = request.kind();

        if let Err(err) = self.validate(&request) {
            crate::metrics::record_mutation(kind.as_str(), "rejected");
            return Err(err);
        }

        let key = request.key().clone();
        let Some(pre) = self.store.get(&key) else {
            crate::metrics::record_mutation(kind.as_str(), "rejected");
            return Err(EngineError::validation("partition not loaded"));
        };

        let mutation_id = MutationId::new();
        let guard = request.guard();
        let pending = PendingMutation {
            mutation_id,
            kind,
            key: key.clone(),
            guard: guard.clone(),
            target: request.target().cloned(),
            parent: match &request {
                MutationRequest::Create { parent, .. } => parent.clone(),
                _ => None,
            },
            snapshot: pre,
        };
        if let Err(err) = self.ledger.begin(pending) {
            crate::metrics::record_mutation(kind.as_str(), "rejected");
            return Err(err);
        }

        // Synthesize under the partition lock so the provisional update is
        // built on the current forest, then refresh the rollback snapshot to
        // that same value (the guard is held, so our node cannot move under
        // us from here on).
        let mutated = self.store.mutate(&key, |forest| {
            let prior = forest.shared_clone();
            synthesize(forest, &request, mutation_id)
                .map(|s| (s.forest, (prior, s.provisional_id, s.expand_path, s.like_desired)))
        });

        let (forest, (prior, provisional_id, expand_path, like_desired)) = match mutated {
            Some(Ok(result)) => result,
            Some(Err(err)) => {
                self.ledger.settle(&guard);
                crate::metrics::record_mutation(kind.as_str(), "rejected");
                return Err(err);
            }
            None => {
                // Partition evicted between the lookup and the lock.
                self.ledger.settle(&guard);
                crate::metrics::record_mutation(kind.as_str(), "rejected");
                return Err(EngineError::validation("partition not loaded"));
            }
        };
        self.ledger.refresh_snapshot(&guard, Arc::new(prior));

        // A reply must be visible even when its ancestors are collapsed.
        for ancestor in &expand_path {
            self.view.force_expand(ancestor);
        }

        crate::metrics::record_mutation(kind.as_str(), "dispatched");
        crate::metrics::set_pending_mutations(self.ledger.len());
        debug!(mutation = %mutation_id, "provisional update applied");

        let (tx, rx) = tokio::sync::oneshot::channel();
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let result = engine
                .settle_mutation(request, guard, like_desired, started)
                .await;
            // The caller may have dropped the handle; that is fine.
            let _ = tx.send(result);
        });

        Ok(DispatchAck {
            mutation_id,
            forest,
            provisional_id,
            handle: MutationHandle::new(mutation_id, rx),
        })
    }

    /// Network round-trip and reconciliation for one dispatched mutation.
    async fn settle_mutation(
        &self,
        request: MutationRequest,
        guard: GuardKey,
        like_desired: Option<bool>,
        started: Instant,
    ) -> Result<(), EngineError> {
        let kind = request.kind();
        let Some(pending) = self.ledger.peek(&guard) else {
            return Err(EngineError::fatal("pending mutation vanished before settling"));
        };

        let result = match self.perform(&request, like_desired).await {
            Ok(outcome) => {
                let status = match outcome {
                    ServerOutcome::Idempotent => "idempotent",
                    _ => "confirmed",
                };
                reconcile::apply_success(&self.store, &self.config, &pending, &outcome);
                crate::metrics::record_mutation(kind.as_str(), status);
                info!(mutation = %pending.mutation_id, outcome = outcome.label(), "mutation settled");
                Ok(())
            }
            Err(err) => {
                reconcile::apply_rollback(&self.store, &pending);
                crate::metrics::record_mutation(kind.as_str(), "rolled_back");
                warn!(mutation = %pending.mutation_id, error = %err, "mutation rolled back");
                Err(err)
            }
        };

        // Release the guard only after the cache reflects the result, so the
        // next mutation on this node synthesizes from settled state.
        self.ledger.settle(&guard);
        crate::metrics::record_mutation_latency(kind.as_str(), started.elapsed());
        crate::metrics::set_pending_mutations(self.ledger.len());
        result
    }

    /// Call the collaborator, folding idempotent server states into success.
    async fn perform(
        &self,
        request: &MutationRequest,
        like_desired: Option<bool>,
    ) -> Result<ServerOutcome, EngineError> {
        match request {
            MutationRequest::Create {
                key,
                parent,
                content,
                ..
            } => match self
                .backend
                .create_comment(key.target_type, &key.target_id, parent.as_ref(), content)
                .await
            {
                Ok(payload) => Ok(ServerOutcome::Created(payload)),
                Err(err) => Err(classify_remote(err)),
            },

            MutationRequest::Edit { node, content, .. } => {
                match self.backend.edit_comment(node, content).await {
                    Ok(payload) => Ok(ServerOutcome::Edited(payload)),
                    Err(err) => Err(classify_remote(err)),
                }
            }

            MutationRequest::Delete { node, .. } => {
                match self.backend.delete_comment(node).await {
                    Ok(()) => Ok(ServerOutcome::Deleted),
                    // Another actor already deleted it; the desired end state
                    // is reached, so this is confirmation, not failure.
                    Err(RemoteError::NotFound | RemoteError::AlreadyApplied) => {
                        Ok(ServerOutcome::Idempotent)
                    }
                    Err(err) => Err(classify_remote(err)),
                }
            }

            MutationRequest::Restore { node, .. } => {
                match self.backend.restore_comment(node).await {
                    Ok(()) => Ok(ServerOutcome::Restored),
                    Err(RemoteError::AlreadyApplied) => Ok(ServerOutcome::Idempotent),
                    Err(err) => Err(classify_remote(err)),
                }
            }

            MutationRequest::LikeToggle { node, .. } => {
                let Some(desired) = like_desired else {
                    return Err(EngineError::fatal("like toggle without desired state"));
                };
                match self.backend.toggle_like(node, desired).await {
                    Ok(payload) => Ok(ServerOutcome::Liked(payload)),
                    Err(RemoteError::AlreadyApplied) => Ok(ServerOutcome::Idempotent),
                    Err(err) => Err(classify_remote(err)),
                }
            }
        }
    }

    fn validate(&self, request: &MutationRequest) -> Result<(), EngineError> {
        if request.key().viewer.is_empty() {
            return Err(EngineError::validation("missing viewer identity"));
        }
        match request {
            MutationRequest::Create { content, .. } | MutationRequest::Edit { content, .. } => {
                if content.trim().is_empty() {
                    return Err(EngineError::validation("empty content"));
                }
                if content.chars().count() > self.config.max_content_len {
                    return Err(EngineError::validation("content too long"));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // --- Collapse state ---

    /// Default is expanded.
    #[must_use]
    pub fn is_collapsed(&self, id: &NodeId) -> bool {
        self.view.is_collapsed(id)
    }

    /// Flip a node's collapse flag; returns the new state.
    pub fn toggle_collapsed(&self, id: &NodeId) -> bool {
        let collapsed = self.view.toggle(id);
        crate::metrics::set_view_entries(self.view.len());
        collapsed
    }

    /// Idempotent expansion.
    pub fn force_expand(&self, id: &NodeId) {
        self.view.force_expand(id);
    }

    // --- Diagnostics ---

    /// Point-in-time counters; also refreshes the engine gauges.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let stats = EngineStats {
            partitions: self.store.len(),
            pending_mutations: self.ledger.len(),
            view_entries: self.view.len(),
        };
        crate::metrics::set_partitions(stats.partitions);
        crate::metrics::set_pending_mutations(stats.pending_mutations);
        crate::metrics::set_view_entries(stats.view_entries);
        stats
    }

    fn collect_collapsed(&self, nodes: &[Arc<CommentNode>], out: &mut HashSet<NodeId>) {
        for node in nodes {
            if self.view.is_collapsed(&node.id) {
                out.insert(node.id.clone());
            }
            self.collect_collapsed(&node.children, out);
        }
    }
}

fn classify_remote(err: RemoteError) -> EngineError {
    match err {
        RemoteError::Malformed(reason) => {
            EngineError::fatal(format!("malformed server payload: {reason}"))
        }
        other => EngineError::Transient(other),
    }
}
