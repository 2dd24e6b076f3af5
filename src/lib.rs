//! # Comment Sync
//!
//! An optimistic synchronization engine for hierarchical comment threads.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Presentation Layer                      │
//! │  • snapshot()/changes() for rendering                      │
//! │  • dispatch() for mutations, completion handle per call    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CommentEngine                          │
//! │  • Validates, guards (one pending mutation per node)       │
//! │  • Synthesizes provisional forest updates                  │
//! │  • Reconciles server results / applies targeted rollback   │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                   │
//!          ▼                   ▼                   ▼
//! ┌────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │   TreeStore    │ │  ViewStateStore  │ │  CommentBackend  │
//! │  partitioned   │ │  collapse flags  │ │  abstract server │
//! │  forest cache, │ │  keyed by node   │ │  (HTTP impl is   │
//! │  LRU-bounded   │ │  id, refetch-    │ │  supplied by the │
//! │                │ │  proof           │ │  application)    │
//! └────────────────┘ └──────────────────┘ └──────────────────┘
//! ```
//!
//! Forests are immutable snapshots with structural sharing: an update rebuilds
//! only the path from the root to the touched node and shares every other
//! subtree by reference, so readers can hold a snapshot across a render frame
//! while mutations land concurrently.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use comment_sync::{
//!     AuthorRef, CommentEngine, CommentEngineConfig, MutationRequest,
//!     PartitionKey, SortMode, TargetType, ViewerId,
//! };
//! use comment_sync::remote::mock::MockBackend;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), comment_sync::EngineError> {
//!     let engine = Arc::new(CommentEngine::new(
//!         CommentEngineConfig::default(),
//!         Arc::new(MockBackend::new()), // swap for your HTTP backend
//!     ));
//!
//!     let key = PartitionKey::new(
//!         TargetType::Post, "post-1", SortMode::Newest, ViewerId::new("viewer-1"),
//!     );
//!     engine.load(&key).await?;
//!
//!     // Optimistic reply: visible immediately, settled in the background.
//!     let ack = engine.dispatch(MutationRequest::Create {
//!         key: key.clone(),
//!         parent: None,
//!         author: AuthorRef::new("viewer-1", "Viewer"),
//!         content: "first!".into(),
//!     })?;
//!     ack.handle.settled().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Optimistic mutations**: create/reply, edit, soft-delete, restore and
//!   like-toggle apply locally before the server confirms
//! - **Targeted rollback**: a failed mutation restores exactly the affected
//!   node; interleaved unrelated mutations are never discarded
//! - **Idempotent server states**: "already deleted"/"already liked" count as
//!   confirmation, not failure
//! - **Count authority**: server-reported like/reply counts always win over
//!   local arithmetic
//! - **Partition isolation**: one cache partition per (target, sort, viewer),
//!   LRU-bounded, viewer-invalidated on logout
//! - **Refetch-proof collapse state**: collapse flags are keyed by node id
//!   and survive wholesale forest replacement
//!
//! ## Configuration
//!
//! See [`CommentEngineConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`engine`]: The main [`CommentEngine`] orchestrating all components
//! - [`forest`]: Persistent comment trees with structure-sharing updates
//! - [`store`]: Partitioned forest cache with revision channels
//! - [`mutation`]: Mutation requests, pending ledger, provisional synthesis
//! - [`reconcile`]: Merging server results, rollback on failure
//! - [`view_state`]: Collapse/expand side table
//! - [`remote`]: The network collaborator boundary (and a test mock)

pub mod config;
pub mod error;
pub mod node;
pub mod forest;
pub mod partition;
pub mod store;
pub mod view_state;
pub mod mutation;
pub mod reconcile;
pub mod remote;
pub mod engine;
pub mod metrics;

pub use config::CommentEngineConfig;
pub use engine::{CommentEngine, DispatchAck, EngineStats, ForestSnapshot, MutationHandle};
pub use error::EngineError;
pub use forest::{CommentForest, InsertPosition, TreeOutcome};
pub use mutation::{GuardKey, MutationKind, MutationRequest, PendingMutation};
pub use node::{AuthorRef, CommentNode, MutationId, NodeId};
pub use partition::{PartitionKey, SortMode, TargetType, ViewerId};
pub use reconcile::ServerOutcome;
pub use remote::traits::{
    CommentBackend, CreatedComment, EditedComment, LikeOutcome, RemoteError,
};
