// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Scriptable in-memory backend for tests.
//!
//! [`MockBackend`] answers every [`CommentBackend`] call from local state:
//! seeded forests, queued failure injections, queued response overrides and
//! per-operation gates that hold a call in flight until the test releases it
//! (for exercising pending-mutation windows deterministically).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::node::{now_millis, CommentNode, NodeId};
use crate::partition::{SortMode, TargetType};
use crate::remote::traits::{
    CommentBackend, CreatedComment, EditedComment, LikeOutcome, RemoteError,
};

/// Backend operation, for scripting failures and gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Fetch,
    Create,
    Edit,
    Delete,
    Restore,
    Like,
}

type ForestKey = (TargetType, String, SortMode);

#[derive(Default)]
struct Script {
    failures: HashMap<Op, Vec<RemoteError>>,
    like_responses: Vec<LikeOutcome>,
    create_responses: Vec<CreatedComment>,
}

/// In-memory [`CommentBackend`] used by the integration tests.
#[derive(Default)]
pub struct MockBackend {
    forests: Mutex<HashMap<ForestKey, Vec<CommentNode>>>,
    script: Mutex<Script>,
    gates: Mutex<HashMap<Op, Arc<Notify>>>,
    calls: Mutex<Vec<Op>>,
    next_id: AtomicU64,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1000),
            ..Default::default()
        }
    }

    /// Seed the forest returned by `fetch_forest` for a key.
    pub fn put_forest(
        &self,
        target_type: TargetType,
        target_id: &str,
        sort: SortMode,
        nodes: Vec<CommentNode>,
    ) {
        self.forests
            .lock()
            .insert((target_type, target_id.to_string(), sort), nodes);
    }

    /// Queue a failure for the next call of `op` (FIFO per op).
    pub fn fail_next(&self, op: Op, err: RemoteError) {
        self.script.lock().failures.entry(op).or_default().push(err);
    }

    /// Queue an override for the next `toggle_like` response.
    pub fn respond_like(&self, outcome: LikeOutcome) {
        self.script.lock().like_responses.push(outcome);
    }

    /// Queue an override for the next `create_comment` response.
    pub fn respond_create(&self, created: CreatedComment) {
        self.script.lock().create_responses.push(created);
    }

    /// Hold the next calls of `op` until [`release`](Self::release) is called.
    pub fn hold(&self, op: Op) {
        self.gates.lock().entry(op).or_insert_with(|| Arc::new(Notify::new()));
    }

    /// Release one held call of `op`.
    pub fn release(&self, op: Op) {
        if let Some(gate) = self.gates.lock().get(&op) {
            gate.notify_one();
        }
    }

    /// Number of calls seen for `op`.
    #[must_use]
    pub fn call_count(&self, op: Op) -> usize {
        self.calls.lock().iter().filter(|c| **c == op).count()
    }

    async fn enter(&self, op: Op) -> Result<(), RemoteError> {
        self.calls.lock().push(op);
        let gate = self.gates.lock().get(&op).map(Arc::clone);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let queued = {
            let mut script = self.script.lock();
            match script.failures.get_mut(&op) {
                Some(queue) if !queue.is_empty() => Some(queue.remove(0)),
                _ => None,
            }
        };
        match queued {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CommentBackend for MockBackend {
    async fn fetch_forest(
        &self,
        target_type: TargetType,
        target_id: &str,
        sort: SortMode,
    ) -> Result<Vec<CommentNode>, RemoteError> {
        self.enter(Op::Fetch).await?;
        Ok(self
            .forests
            .lock()
            .get(&(target_type, target_id.to_string(), sort))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_comment(
        &self,
        _target_type: TargetType,
        _target_id: &str,
        parent: Option<&NodeId>,
        content: &str,
    ) -> Result<CreatedComment, RemoteError> {
        self.enter(Op::Create).await?;
        let _ = (parent, content);
        let scripted = {
            let mut script = self.script.lock();
            if script.create_responses.is_empty() {
                None
            } else {
                Some(script.create_responses.remove(0))
            }
        };
        Ok(scripted.unwrap_or_else(|| CreatedComment {
            node_id: NodeId::new(format!("srv-{}", self.next_id.fetch_add(1, Ordering::Relaxed))),
            created_at: now_millis(),
            parent_reply_count: None,
        }))
    }

    async fn edit_comment(
        &self,
        _node: &NodeId,
        _content: &str,
    ) -> Result<EditedComment, RemoteError> {
        self.enter(Op::Edit).await?;
        Ok(EditedComment {
            edited_at: now_millis(),
        })
    }

    async fn delete_comment(&self, _node: &NodeId) -> Result<(), RemoteError> {
        self.enter(Op::Delete).await?;
        Ok(())
    }

    async fn restore_comment(&self, _node: &NodeId) -> Result<(), RemoteError> {
        self.enter(Op::Restore).await?;
        Ok(())
    }

    async fn toggle_like(
        &self,
        _node: &NodeId,
        desired: bool,
    ) -> Result<LikeOutcome, RemoteError> {
        self.enter(Op::Like).await?;
        let scripted = {
            let mut script = self.script.lock();
            if script.like_responses.is_empty() {
                None
            } else {
                Some(script.like_responses.remove(0))
            }
        };
        Ok(scripted.unwrap_or(LikeOutcome {
            like_count: u32::from(desired),
            viewer_has_liked: desired,
        }))
    }
}
