//! Comment node data structures.
//!
//! The [`CommentNode`] is the core data unit that flows through the engine.
//! Nodes form ordered trees: each node carries its children directly, wrapped
//! in [`Arc`] so that tree updates can share unchanged subtrees instead of
//! deep-copying them.
//!
//! Two kinds of identity exist:
//! - Server-confirmed ids, stable for the lifetime of the comment.
//! - Provisional ids (`tmp-<uuid>`), minted locally for an in-flight creation
//!   and replaced once the server confirms. Provisional nodes additionally
//!   carry the [`MutationId`] that created them, which is what reconciliation
//!   matches on (temporary ids are display-only).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current wall-clock time as epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Identity of a comment node.
///
/// Server-confirmed ids are opaque strings handed out by the backend and are
/// stable across refetches and sort-mode switches. [`NodeId::provisional`]
/// mints a local placeholder id for a node the server has not seen yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a locally-unique placeholder id for an in-flight creation.
    #[must_use]
    pub fn provisional() -> Self {
        Self(format!("tmp-{}", Uuid::new_v4()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Identity of one dispatched mutation.
///
/// Reconciliation matches provisional nodes by this id rather than by their
/// temporary node id, so id reuse can never cause a wrong substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(Uuid);

impl MutationId {
    #[allow(clippy::new_without_default)]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to a comment author.
///
/// The engine never interprets author data; it travels through so presentation
/// layers can render it without a second lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRef {
    pub id: String,
    pub display_name: String,
}

impl AuthorRef {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// A single comment in a tree.
///
/// # Example
///
/// ```
/// use comment_sync::{AuthorRef, CommentNode, NodeId};
///
/// let node = CommentNode::new(
///     NodeId::new("42"),
///     None,
///     AuthorRef::new("u1", "Ada"),
///     "first!",
/// );
///
/// assert_eq!(node.id.as_str(), "42");
/// assert_eq!(node.like_count, 0);
/// assert!(!node.is_provisional());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentNode {
    pub id: NodeId,
    /// `None` for top-level comments.
    pub parent_id: Option<NodeId>,
    pub author: AuthorRef,
    pub content: String,
    /// Creation timestamp (epoch millis). Provisional until server-confirmed.
    pub created_at: i64,
    /// Last edit timestamp (epoch millis), if ever edited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<i64>,
    /// Soft-deletion flag. A deleted node keeps its position and children.
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_edited: bool,
    pub like_count: u32,
    pub reply_count: u32,
    /// Whether the viewing user has liked this node. Viewer-relative, which
    /// is why partitions are keyed by viewer identity.
    #[serde(default)]
    pub viewer_has_liked: bool,
    /// Set while this node is an in-flight creation; cleared on confirmation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisional: Option<MutationId>,
    /// Ordered children, most-recent-first for replies. Ordering is
    /// server-provided and never rearranged by the client.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Arc<CommentNode>>,
}

impl CommentNode {
    /// Create a server-confirmed node with no children.
    pub fn new(
        id: NodeId,
        parent_id: Option<NodeId>,
        author: AuthorRef,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            parent_id,
            author,
            content: content.into(),
            created_at: now_millis(),
            edited_at: None,
            is_deleted: false,
            is_edited: false,
            like_count: 0,
            reply_count: 0,
            viewer_has_liked: false,
            provisional: None,
            children: Vec::new(),
        }
    }

    /// Create a provisional node for an in-flight creation.
    ///
    /// Provisional nodes start with zeroed counters; the server-confirmed
    /// values replace them at reconciliation.
    pub fn provisional(
        mutation_id: MutationId,
        parent_id: Option<NodeId>,
        author: AuthorRef,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: NodeId::provisional(),
            parent_id,
            author,
            content: content.into(),
            created_at: now_millis(),
            edited_at: None,
            is_deleted: false,
            is_edited: false,
            like_count: 0,
            reply_count: 0,
            viewer_has_liked: false,
            provisional: Some(mutation_id),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_provisional(&self) -> bool {
        self.provisional.is_some()
    }

    /// Whether interactive actions (reply, edit) are allowed on this node.
    #[must_use]
    pub fn accepts_interaction(&self) -> bool {
        !self.is_deleted && !self.is_provisional()
    }

    /// Apply the tombstone transform: mark deleted and replace the body with
    /// the placeholder. Children and tree position are untouched. Idempotent.
    #[must_use]
    pub fn tombstoned(&self, marker: &str) -> Self {
        let mut node = self.clone();
        node.is_deleted = true;
        node.content = marker.to_string();
        node
    }

    /// Total number of nodes in this subtree, including self.
    #[must_use]
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(|c| c.subtree_len()).sum::<usize>()
    }
}
