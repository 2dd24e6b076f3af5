//! Cache partition keys.
//!
//! Every comment forest lives in an isolated partition keyed by
//! `(target type, target id, sort mode, viewer)`. Sort modes are disjoint
//! partitions because the server orders each listing independently; viewer
//! identity is part of the key because like state is viewer-relative, and a
//! shared partition would leak one viewer's like flags to another.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::forest::InsertPosition;

/// Kind of entity a comment thread hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Post,
    Video,
    Gallery,
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post => write!(f, "post"),
            Self::Video => write!(f, "video"),
            Self::Gallery => write!(f, "gallery"),
        }
    }
}

/// Server-side ordering of top-level comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    Newest,
    Oldest,
    Top,
}

impl SortMode {
    /// Where a just-created top-level comment is placed in this ordering.
    ///
    /// Newest-first listings show it immediately at the head. In the other
    /// orderings a fresh comment (oldest timestamp last, zero likes) belongs
    /// at the tail until the server re-sorts on the next fetch.
    #[must_use]
    pub fn top_level_insert_position(&self) -> InsertPosition {
        match self {
            Self::Newest => InsertPosition::Head,
            Self::Oldest | Self::Top => InsertPosition::Tail,
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Newest => write!(f, "newest"),
            Self::Oldest => write!(f, "oldest"),
            Self::Top => write!(f, "top"),
        }
    }
}

/// Identity of the viewing user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewerId(String);

impl ViewerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ViewerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Key of one isolated cache partition.
///
/// # Example
///
/// ```
/// use comment_sync::{PartitionKey, SortMode, TargetType, ViewerId};
///
/// let key = PartitionKey::new(TargetType::Post, "p1", SortMode::Newest, ViewerId::new("v1"));
/// let other_sort = key.with_sort(SortMode::Top);
/// assert_ne!(key, other_sort); // disjoint partitions
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub target_type: TargetType,
    pub target_id: String,
    pub sort: SortMode,
    pub viewer: ViewerId,
}

impl PartitionKey {
    pub fn new(
        target_type: TargetType,
        target_id: impl Into<String>,
        sort: SortMode,
        viewer: ViewerId,
    ) -> Self {
        Self {
            target_type,
            target_id: target_id.into(),
            sort,
            viewer,
        }
    }

    /// The same target and viewer under a different ordering.
    #[must_use]
    pub fn with_sort(&self, sort: SortMode) -> Self {
        Self {
            sort,
            ..self.clone()
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}?sort={}&viewer={}",
            self.target_type, self.target_id, self.sort, self.viewer
        )
    }
}
