//! Configuration for the comment engine.
//!
//! # Example
//!
//! ```
//! use comment_sync::CommentEngineConfig;
//!
//! // Minimal config (uses defaults)
//! let config = CommentEngineConfig::default();
//! assert_eq!(config.max_partitions, 64);
//!
//! // Full config
//! let config = CommentEngineConfig {
//!     max_partitions: 16,
//!     max_view_entries: 1024,
//!     tombstone_marker: "[removed]".into(),
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

/// Configuration for the comment engine.
///
/// All fields have sensible defaults. The bounds exist so a long-lived UI
/// session (many targets visited, many sort switches) cannot grow the cache
/// or the collapse side-table without limit.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentEngineConfig {
    /// Maximum number of cache partitions kept alive at once.
    /// Least-recently-accessed partitions are evicted beyond this bound.
    #[serde(default = "default_max_partitions")]
    pub max_partitions: usize,

    /// Maximum number of collapse-state entries retained.
    /// Oldest-touched entries are swept beyond this bound.
    #[serde(default = "default_max_view_entries")]
    pub max_view_entries: usize,

    /// Maximum accepted comment body length in characters.
    #[serde(default = "default_max_content_len")]
    pub max_content_len: usize,

    /// Placeholder text installed when a delete is server-confirmed.
    #[serde(default = "default_tombstone_marker")]
    pub tombstone_marker: String,
}

fn default_max_partitions() -> usize { 64 }
fn default_max_view_entries() -> usize { 4096 }
fn default_max_content_len() -> usize { 10_000 }
fn default_tombstone_marker() -> String { "[deleted]".to_string() }

impl Default for CommentEngineConfig {
    fn default() -> Self {
        Self {
            max_partitions: default_max_partitions(),
            max_view_entries: default_max_view_entries(),
            max_content_len: default_max_content_len(),
            tombstone_marker: default_tombstone_marker(),
        }
    }
}
