// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Optimistic mutation requests, the pending ledger and provisional synthesis.
//!
//! Synthesis is pure and synchronous: given the current forest and a request
//! it produces the provisionally-updated forest, without touching the ledger
//! or the network. The ledger enforces the concurrency rule — at most one
//! mutation in flight per guard (the target node, or the partition root for
//! top-level creates); a second request for the same guard is rejected
//! synchronously with `ConflictPending`, never queued.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::EngineError;
use crate::forest::{CommentForest, InsertPosition};
use crate::node::{now_millis, AuthorRef, CommentNode, MutationId, NodeId};
use crate::partition::PartitionKey;

/// Kind of mutation, for ledgers, logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Edit,
    Delete,
    Restore,
    LikeToggle,
}

impl MutationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Restore => "restore",
            Self::LikeToggle => "like_toggle",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation as dispatched by a presentation layer.
#[derive(Debug, Clone)]
pub enum MutationRequest {
    /// New top-level comment (`parent: None`) or reply.
    Create {
        key: PartitionKey,
        parent: Option<NodeId>,
        author: AuthorRef,
        content: String,
    },
    Edit {
        key: PartitionKey,
        node: NodeId,
        content: String,
    },
    Delete {
        key: PartitionKey,
        node: NodeId,
    },
    Restore {
        key: PartitionKey,
        node: NodeId,
    },
    LikeToggle {
        key: PartitionKey,
        node: NodeId,
    },
}

impl MutationRequest {
    #[must_use]
    pub fn key(&self) -> &PartitionKey {
        match self {
            Self::Create { key, .. }
            | Self::Edit { key, .. }
            | Self::Delete { key, .. }
            | Self::Restore { key, .. }
            | Self::LikeToggle { key, .. } => key,
        }
    }

    #[must_use]
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::Create { .. } => MutationKind::Create,
            Self::Edit { .. } => MutationKind::Edit,
            Self::Delete { .. } => MutationKind::Delete,
            Self::Restore { .. } => MutationKind::Restore,
            Self::LikeToggle { .. } => MutationKind::LikeToggle,
        }
    }

    /// The node this mutation writes to, if it targets an existing node.
    #[must_use]
    pub fn target(&self) -> Option<&NodeId> {
        match self {
            Self::Create { .. } => None,
            Self::Edit { node, .. }
            | Self::Delete { node, .. }
            | Self::Restore { node, .. }
            | Self::LikeToggle { node, .. } => Some(node),
        }
    }

    /// Exclusivity guard for this request.
    ///
    /// A reply guards its parent (the parent's subtree and reply count are
    /// what it writes to); everything else guards the node itself; top-level
    /// creates guard the partition root.
    #[must_use]
    pub fn guard(&self) -> GuardKey {
        match self {
            Self::Create {
                parent: Some(parent),
                ..
            } => GuardKey::Node(parent.clone()),
            Self::Create { key, parent: None, .. } => GuardKey::Root(key.clone()),
            Self::Edit { node, .. }
            | Self::Delete { node, .. }
            | Self::Restore { node, .. }
            | Self::LikeToggle { node, .. } => GuardKey::Node(node.clone()),
        }
    }
}

/// What a pending mutation holds exclusive write access to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GuardKey {
    Node(NodeId),
    /// Top-level creation slot of one partition.
    Root(PartitionKey),
}

impl GuardKey {
    /// Human-readable target for `ConflictPending` messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Node(id) => id.to_string(),
            Self::Root(key) => format!("<top-level of {key}>"),
        }
    }
}

/// Ledger entry for one in-flight mutation.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub mutation_id: MutationId,
    pub kind: MutationKind,
    pub key: PartitionKey,
    pub guard: GuardKey,
    /// Node being mutated; `None` for creations (no server id yet).
    pub target: Option<NodeId>,
    /// Parent of a created reply, for reply-count bookkeeping.
    pub parent: Option<NodeId>,
    /// Forest value for `key` before the provisional update. Rollback reads
    /// the prior node value out of this snapshot.
    pub snapshot: Arc<CommentForest>,
}

/// In-flight mutation ledger: at most one entry per guard.
#[derive(Default)]
pub struct PendingLedger {
    inflight: DashMap<GuardKey, PendingMutation>,
}

impl PendingLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the guard. Fails synchronously if one is already in flight.
    pub fn begin(&self, pending: PendingMutation) -> Result<(), EngineError> {
        match self.inflight.entry(pending.guard.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(EngineError::ConflictPending {
                node: pending.guard.describe(),
            }),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(pending);
                Ok(())
            }
        }
    }

    /// Release the guard, returning its entry.
    pub fn settle(&self, guard: &GuardKey) -> Option<PendingMutation> {
        self.inflight.remove(guard).map(|(_, pending)| pending)
    }

    /// Clone the in-flight entry without releasing the guard.
    #[must_use]
    pub fn peek(&self, guard: &GuardKey) -> Option<PendingMutation> {
        self.inflight.get(guard).map(|entry| entry.clone())
    }

    /// Replace the rollback snapshot of an in-flight entry with the forest
    /// value observed at synthesis time.
    pub fn refresh_snapshot(&self, guard: &GuardKey, snapshot: Arc<CommentForest>) {
        if let Some(mut entry) = self.inflight.get_mut(guard) {
            entry.snapshot = snapshot;
        }
    }

    #[must_use]
    pub fn contains(&self, guard: &GuardKey) -> bool {
        self.inflight.contains_key(guard)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }
}

/// Result of provisional synthesis.
#[derive(Debug)]
pub struct Synthesis {
    pub forest: CommentForest,
    /// Temporary id of the inserted node, for creations.
    pub provisional_id: Option<NodeId>,
    /// Ancestors to force-expand so the inserted node is visible.
    pub expand_path: Vec<NodeId>,
    /// Like state requested from the server, for like toggles.
    pub like_desired: Option<bool>,
}

/// Synthesize the provisional forest for a request.
///
/// Pure: no ledger, no network, no store access. Validation failures leave
/// the forest untouched by construction (the error is returned before any
/// tree is built).
pub fn synthesize(
    forest: &CommentForest,
    request: &MutationRequest,
    mutation_id: MutationId,
) -> Result<Synthesis, EngineError> {
    match request {
        MutationRequest::Create {
            key,
            parent,
            author,
            content,
        } => {
            let (position, expand_path) = match parent {
                Some(parent_id) => {
                    let parent_node = forest
                        .find(parent_id)
                        .ok_or_else(|| EngineError::validation("unknown parent node"))?;
                    if parent_node.is_deleted {
                        return Err(EngineError::validation("cannot reply to a deleted comment"));
                    }
                    if parent_node.is_provisional() {
                        return Err(EngineError::validation(
                            "parent comment is awaiting confirmation",
                        ));
                    }
                    // Replies are most-recent-first regardless of sort mode.
                    let path = forest.path_to(parent_id).unwrap_or_default();
                    (InsertPosition::Head, path)
                }
                None => (key.sort.top_level_insert_position(), Vec::new()),
            };

            let node =
                CommentNode::provisional(mutation_id, parent.clone(), author.clone(), content.clone());
            let provisional_id = node.id.clone();

            let (forest, outcome) = forest.insert_child(parent.as_ref(), node, position);
            if !outcome.is_applied() {
                return Err(EngineError::validation("unknown parent node"));
            }

            // Parent reply count bridges display latency until the server
            // reports the authoritative value.
            let forest = match parent {
                Some(parent_id) => {
                    let (forest, _) = forest.update_node(parent_id, |n| {
                        let mut n = n.clone();
                        n.reply_count = n.reply_count.saturating_add(1);
                        n
                    });
                    forest
                }
                None => forest,
            };

            Ok(Synthesis {
                forest,
                provisional_id: Some(provisional_id),
                expand_path,
                like_desired: None,
            })
        }

        MutationRequest::Edit { node, content, .. } => {
            let target = require_confirmed(forest, node)?;
            if target.is_deleted {
                return Err(EngineError::validation("cannot edit a deleted comment"));
            }
            let content = content.clone();
            let (forest, _) = forest.update_node(node, move |n| {
                let mut n = n.clone();
                n.content = content.clone();
                n.is_edited = true;
                n.edited_at = Some(now_millis());
                n
            });
            Ok(Synthesis {
                forest,
                provisional_id: None,
                expand_path: Vec::new(),
                like_desired: None,
            })
        }

        MutationRequest::Delete { node, .. } => {
            require_confirmed(forest, node)?;
            // Content is kept until the server confirms, so a failed delete
            // restores the exact prior body without a refetch.
            let (forest, _) = forest.update_node(node, |n| {
                let mut n = n.clone();
                n.is_deleted = true;
                n
            });
            Ok(Synthesis {
                forest,
                provisional_id: None,
                expand_path: Vec::new(),
                like_desired: None,
            })
        }

        MutationRequest::Restore { node, .. } => {
            require_confirmed(forest, node)?;
            let (forest, _) = forest.update_node(node, |n| {
                let mut n = n.clone();
                n.is_deleted = false;
                n
            });
            Ok(Synthesis {
                forest,
                provisional_id: None,
                expand_path: Vec::new(),
                like_desired: None,
            })
        }

        MutationRequest::LikeToggle { node, .. } => {
            let target = require_confirmed(forest, node)?;
            let desired = !target.viewer_has_liked;
            let (forest, _) = forest.update_node(node, |n| {
                let mut n = n.clone();
                n.viewer_has_liked = desired;
                n.like_count = if desired {
                    n.like_count.saturating_add(1)
                } else {
                    n.like_count.saturating_sub(1)
                };
                n
            });
            Ok(Synthesis {
                forest,
                provisional_id: None,
                expand_path: Vec::new(),
                like_desired: Some(desired),
            })
        }
    }
}

/// Look up a mutation target that must exist and be server-confirmed.
fn require_confirmed<'a>(
    forest: &'a CommentForest,
    node: &NodeId,
) -> Result<&'a Arc<CommentNode>, EngineError> {
    let target = forest
        .find(node)
        .ok_or_else(|| EngineError::validation("unknown node"))?;
    if target.is_provisional() {
        return Err(EngineError::validation("comment is awaiting confirmation"));
    }
    Ok(target)
}
