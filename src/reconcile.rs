// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Merging server-confirmed mutation results into the live cache.
//!
//! Reconciliation always walks the *current* forest, never the snapshot taken
//! when the mutation started: unrelated mutations that landed in the meantime
//! must survive. Provisional creations are matched by their mutation-scoped
//! marker rather than by temporary id. Whenever the server reports an
//! authoritative count it wins outright; local arithmetic is only a display
//! latency bridge.
//!
//! The same rule picks the destination partition: a reconciliation that
//! arrives after a sort-mode switch (or an eviction) is applied to whichever
//! partition currently holds the node, and dropped silently when none does —
//! the user is no longer looking at that ordering, so there is nothing to
//! update and nothing to report.

use tracing::{debug, warn};

use crate::config::CommentEngineConfig;
use crate::mutation::PendingMutation;
use crate::partition::PartitionKey;
use crate::remote::traits::{CreatedComment, EditedComment, LikeOutcome};
use crate::store::TreeStore;

/// Confirmed result of one mutation, as reported by the backend.
#[derive(Debug, Clone)]
pub enum ServerOutcome {
    Created(CreatedComment),
    Edited(EditedComment),
    Deleted,
    Restored,
    Liked(LikeOutcome),
    /// The desired end state was already reached by another actor. Local
    /// optimistic state is kept as-is; nothing is rolled back.
    Idempotent,
}

impl ServerOutcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Edited(_) => "edited",
            Self::Deleted => "deleted",
            Self::Restored => "restored",
            Self::Liked(_) => "liked",
            Self::Idempotent => "idempotent",
        }
    }
}

/// Merge a confirmed outcome into the cache.
pub fn apply_success(
    store: &TreeStore,
    config: &CommentEngineConfig,
    pending: &PendingMutation,
    outcome: &ServerOutcome,
) {
    crate::metrics::record_reconcile(outcome.label());
    match outcome {
        ServerOutcome::Created(payload) => {
            let Some(key) = locate_marker(store, pending) else {
                debug!(mutation = %pending.mutation_id, "reconciliation dropped, provisional node no longer cached");
                return;
            };
            let payload = payload.clone();
            store.update(&key, |forest| {
                forest.update_by_marker(&pending.mutation_id, |n| {
                    let mut n = n.clone();
                    n.id = payload.node_id.clone();
                    n.created_at = payload.created_at;
                    n.provisional = None;
                    n
                })
            });
            if let (Some(parent), Some(reply_count)) =
                (&pending.parent, payload.parent_reply_count)
            {
                store.update(&key, |forest| {
                    forest.update_node(parent, |n| {
                        let mut n = n.clone();
                        n.reply_count = reply_count;
                        n
                    })
                });
            }
        }

        ServerOutcome::Edited(payload) => {
            with_target(store, pending, |store, key, target| {
                store.update(key, |forest| {
                    forest.update_node(target, |n| {
                        let mut n = n.clone();
                        n.is_edited = true;
                        n.edited_at = Some(payload.edited_at);
                        n
                    })
                });
            });
        }

        ServerOutcome::Deleted => {
            let marker = config.tombstone_marker.clone();
            with_target(store, pending, |store, key, target| {
                store.update(key, |forest| {
                    forest.update_node(target, |n| n.tombstoned(&marker))
                });
            });
        }

        ServerOutcome::Restored => {
            with_target(store, pending, |store, key, target| {
                store.update(key, |forest| {
                    forest.update_node(target, |n| {
                        let mut n = n.clone();
                        n.is_deleted = false;
                        n
                    })
                });
            });
        }

        ServerOutcome::Liked(payload) => {
            let payload = *payload;
            with_target(store, pending, |store, key, target| {
                store.update(key, |forest| {
                    forest.update_node(target, |n| {
                        let mut n = n.clone();
                        n.like_count = payload.like_count;
                        n.viewer_has_liked = payload.viewer_has_liked;
                        n
                    })
                });
            });
        }

        ServerOutcome::Idempotent => {
            // Already-applied local state is the desired state; rolling back
            // here would flash the UI through a stale value.
        }
    }
}

/// Undo the provisional update after a failed mutation.
///
/// The restore is targeted: the affected node's scalar fields are reset from
/// the pre-mutation snapshot while its *current* children and reply count are
/// kept, so replies and edits that interleaved elsewhere in the subtree are
/// not discarded. The provisional value is replaced directly by the prior
/// value; no intermediate empty state is ever visible.
pub fn apply_rollback(store: &TreeStore, pending: &PendingMutation) {
    crate::metrics::record_rollback(pending.kind.as_str());
    match &pending.target {
        // Creation: remove the marker-matched provisional node and give back
        // the parent's optimistic reply-count increment.
        None => {
            let Some(key) = locate_marker(store, pending) else {
                debug!(mutation = %pending.mutation_id, "rollback dropped, provisional node no longer cached");
                return;
            };
            store.update(&key, |forest| forest.remove_by_marker(&pending.mutation_id));
            if let Some(parent) = &pending.parent {
                store.update(&key, |forest| {
                    forest.update_node(parent, |n| {
                        let mut n = n.clone();
                        n.reply_count = n.reply_count.saturating_sub(1);
                        n
                    })
                });
            }
        }

        Some(target) => {
            let Some(prior) = pending.snapshot.find(target).cloned() else {
                warn!(node = %target, "rollback snapshot does not contain the target node");
                return;
            };
            with_target(store, pending, |store, key, target| {
                store.update(key, |forest| {
                    forest.update_node(target, |n| {
                        let mut n = n.clone();
                        n.content = prior.content.clone();
                        n.created_at = prior.created_at;
                        n.edited_at = prior.edited_at;
                        n.is_deleted = prior.is_deleted;
                        n.is_edited = prior.is_edited;
                        n.like_count = prior.like_count;
                        n.viewer_has_liked = prior.viewer_has_liked;
                        n
                    })
                });
            });
        }
    }
}

/// Resolve the partition currently holding the pending mutation's target and
/// run `f` on it. Drops the reconciliation silently when the node is gone.
fn with_target(
    store: &TreeStore,
    pending: &PendingMutation,
    f: impl FnOnce(&TreeStore, &PartitionKey, &crate::node::NodeId),
) {
    let Some(target) = &pending.target else {
        return;
    };
    let key = if store
        .get(&pending.key)
        .is_some_and(|forest| forest.contains(target))
    {
        Some(pending.key.clone())
    } else {
        store.locate_node(target)
    };
    match key {
        Some(key) => f(store, &key, target),
        None => {
            debug!(node = %target, "reconciliation dropped, node no longer cached");
        }
    }
}

fn locate_marker(store: &TreeStore, pending: &PendingMutation) -> Option<PartitionKey> {
    if store
        .get(&pending.key)
        .is_some_and(|forest| forest.find_by_marker(&pending.mutation_id).is_some())
    {
        Some(pending.key.clone())
    } else {
        store.locate_marker(&pending.mutation_id)
    }
}
