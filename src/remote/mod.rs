//! Network collaborator boundary.
//!
//! The engine never speaks a transport protocol itself; it calls the
//! [`CommentBackend`](traits::CommentBackend) trait and lets the embedding
//! application supply the HTTP (or other) implementation. The trait's typed
//! payloads and [`RemoteError`](traits::RemoteError) form an explicit result
//! contract: success, idempotent-already-applied and failure are distinct
//! values, never inferred from response shape.

pub mod traits;
pub mod mock;
