// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::{CommentNode, NodeId};
use crate::partition::{SortMode, TargetType};

/// Failure surface of the network collaborator.
///
/// `NotFound` and `AlreadyApplied` are part of the contract on purpose: for
/// some operations they mean the desired end state was already reached by
/// another actor (another tab, another device) and the engine treats them as
/// confirmation rather than failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("node not found")]
    NotFound,
    #[error("already applied")]
    AlreadyApplied,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed server payload: {0}")]
    Malformed(String),
    #[error("rejected by server: {code} {message}")]
    Rejected { code: u16, message: String },
}

/// Server confirmation of a created comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedComment {
    /// The real, stable id replacing the provisional one.
    pub node_id: NodeId,
    /// Authoritative creation timestamp (epoch millis).
    pub created_at: i64,
    /// Authoritative reply count of the parent, when the server reports it.
    /// Always wins over the locally-incremented value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_reply_count: Option<u32>,
}

/// Server confirmation of an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditedComment {
    /// Authoritative edit timestamp (epoch millis).
    pub edited_at: i64,
}

/// Server confirmation of a like toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeOutcome {
    /// Authoritative like count. Always wins over local arithmetic.
    pub like_count: u32,
    pub viewer_has_liked: bool,
}

/// The network collaborator consumed by the engine.
///
/// All operations are effectful calls against an opaque server. Implementors
/// translate transport-level failures into [`RemoteError`] variants; the
/// engine decides which of them are idempotent confirmations.
#[async_trait]
pub trait CommentBackend: Send + Sync {
    /// Fetch the full comment forest for a target under one ordering.
    /// Idempotent read; the result replaces the cache partition wholesale.
    async fn fetch_forest(
        &self,
        target_type: TargetType,
        target_id: &str,
        sort: SortMode,
    ) -> Result<Vec<CommentNode>, RemoteError>;

    /// Create a comment (top-level for `parent == None`) or a reply.
    async fn create_comment(
        &self,
        target_type: TargetType,
        target_id: &str,
        parent: Option<&NodeId>,
        content: &str,
    ) -> Result<CreatedComment, RemoteError>;

    async fn edit_comment(
        &self,
        node: &NodeId,
        content: &str,
    ) -> Result<EditedComment, RemoteError>;

    /// Soft-delete. `Err(NotFound)` means some other actor already deleted
    /// the node; callers treat that as success.
    async fn delete_comment(&self, node: &NodeId) -> Result<(), RemoteError>;

    async fn restore_comment(&self, node: &NodeId) -> Result<(), RemoteError>;

    /// Set the viewer's like state to `desired`. `Err(AlreadyApplied)` means
    /// the server was already in the desired state.
    async fn toggle_like(
        &self,
        node: &NodeId,
        desired: bool,
    ) -> Result<LikeOutcome, RemoteError>;
}
