//! Integration tests for the comment engine.
//!
//! These run the full dispatch → collaborator → reconcile/rollback loop
//! against the scriptable in-memory backend; no network or containers are
//! involved.
//!
//! # Test Organization
//! - `happy_*` - Normal operation: optimistic apply, confirmation, idempotent states
//! - `failure_*` - Failure scenarios: rollback, conflicts, eviction races

use std::sync::Arc;

use comment_sync::remote::mock::{MockBackend, Op};
use comment_sync::{
    AuthorRef, CommentEngine, CommentEngineConfig, CommentNode, EngineError, LikeOutcome,
    MutationRequest, NodeId, PartitionKey, RemoteError, SortMode, TargetType, ViewerId,
};

// =============================================================================
// Helpers
// =============================================================================

fn author() -> AuthorRef {
    AuthorRef::new("v1", "Viewer One")
}

fn key_for(viewer: &str, sort: SortMode) -> PartitionKey {
    PartitionKey::new(TargetType::Post, "post-1", sort, ViewerId::new(viewer))
}

fn key() -> PartitionKey {
    key_for("v1", SortMode::Newest)
}

fn comment(id: &str, content: &str, likes: u32) -> CommentNode {
    let mut node = CommentNode::new(NodeId::new(id), None, author(), content);
    node.like_count = likes;
    node
}

/// Backend seeded with `[A{likes:2}, B, C]` under the default key.
fn seeded_backend() -> Arc<MockBackend> {
    let backend = Arc::new(MockBackend::new());
    backend.put_forest(
        TargetType::Post,
        "post-1",
        SortMode::Newest,
        vec![
            comment("A", "comment a", 2),
            comment("B", "comment b", 0),
            comment("C", "comment c", 0),
        ],
    );
    backend
}

async fn engine_with(backend: Arc<MockBackend>) -> Arc<CommentEngine> {
    let engine = Arc::new(CommentEngine::new(
        CommentEngineConfig::default(),
        backend,
    ));
    engine.load(&key()).await.expect("seed load failed");
    engine
}

// =============================================================================
// Happy Path - Optimistic Apply and Confirmation
// =============================================================================

#[tokio::test]
async fn happy_like_toggle_count_authority() {
    let backend = seeded_backend();
    // Local arithmetic says 3; the server knows better.
    backend.respond_like(LikeOutcome {
        like_count: 5,
        viewer_has_liked: true,
    });
    let engine = engine_with(backend).await;

    let ack = engine
        .dispatch(MutationRequest::LikeToggle {
            key: key(),
            node: NodeId::new("A"),
        })
        .unwrap();

    // Immediate optimistic state: 2 + 1.
    let a = ack.forest.find(&NodeId::new("A")).unwrap();
    assert_eq!(a.like_count, 3);
    assert!(a.viewer_has_liked);

    ack.handle.settled().await.unwrap();

    // Authoritative count wins.
    let a = engine
        .snapshot(&key())
        .unwrap()
        .forest
        .find(&NodeId::new("A"))
        .unwrap()
        .clone();
    assert_eq!(a.like_count, 5);
    assert!(a.viewer_has_liked);
}

#[tokio::test]
async fn happy_reply_provisional_node_replaced_in_place() {
    let backend = seeded_backend();
    backend.respond_create(comment_sync::CreatedComment {
        node_id: NodeId::new("77"),
        created_at: 1_700_000_000_000,
        parent_reply_count: Some(1),
    });
    let engine = engine_with(backend).await;

    let ack = engine
        .dispatch(MutationRequest::Create {
            key: key(),
            parent: Some(NodeId::new("A")),
            author: author(),
            content: "hi".into(),
        })
        .unwrap();

    // Provisional child appears under A at the head immediately.
    let provisional_id = ack.provisional_id.clone().unwrap();
    let a = ack.forest.find(&NodeId::new("A")).unwrap();
    assert_eq!(a.children[0].id, provisional_id);
    assert!(a.children[0].is_provisional());
    assert_eq!(a.children[0].content, "hi");
    assert_eq!(a.reply_count, 1);

    ack.handle.settled().await.unwrap();

    // Replaced by the confirmed node in the same position.
    let a = engine
        .snapshot(&key())
        .unwrap()
        .forest
        .find(&NodeId::new("A"))
        .unwrap()
        .clone();
    assert_eq!(a.children[0].id, NodeId::new("77"));
    assert!(!a.children[0].is_provisional());
    assert_eq!(a.children[0].created_at, 1_700_000_000_000);
    assert_eq!(a.reply_count, 1);
}

#[tokio::test]
async fn happy_top_level_comment_lands_per_sort_convention() {
    let engine = engine_with(seeded_backend()).await;

    let ack = engine
        .dispatch(MutationRequest::Create {
            key: key(),
            parent: None,
            author: author(),
            content: "newest first".into(),
        })
        .unwrap();

    // Newest-first ordering puts the new comment at the head.
    assert!(ack.forest.roots[0].is_provisional());
    ack.handle.settled().await.unwrap();

    let forest = engine.snapshot(&key()).unwrap().forest;
    assert!(!forest.roots[0].is_provisional());
    assert_eq!(forest.roots[0].content, "newest first");
}

#[tokio::test]
async fn happy_idempotent_delete_after_404() {
    let backend = seeded_backend();
    backend.fail_next(Op::Delete, RemoteError::NotFound);
    let engine = engine_with(backend).await;

    let ack = engine
        .dispatch(MutationRequest::Delete {
            key: key(),
            node: NodeId::new("B"),
        })
        .unwrap();

    // Another tab already deleted B; treated as success, no rollback.
    ack.handle.settled().await.unwrap();

    let b = engine
        .snapshot(&key())
        .unwrap()
        .forest
        .find(&NodeId::new("B"))
        .unwrap()
        .clone();
    assert!(b.is_deleted);
    // Like count untouched: the tombstone transform never ran twice.
    assert_eq!(b.like_count, 0);
}

#[tokio::test]
async fn happy_confirmed_delete_tombstones_but_keeps_subtree() {
    let backend = Arc::new(MockBackend::new());
    let mut a = comment("A", "parent", 0);
    a.children.push(Arc::new(CommentNode::new(
        NodeId::new("A1"),
        Some(NodeId::new("A")),
        author(),
        "child survives",
    )));
    backend.put_forest(TargetType::Post, "post-1", SortMode::Newest, vec![a]);
    let engine = engine_with(backend).await;

    let ack = engine
        .dispatch(MutationRequest::Delete {
            key: key(),
            node: NodeId::new("A"),
        })
        .unwrap();
    ack.handle.settled().await.unwrap();

    let a = engine
        .snapshot(&key())
        .unwrap()
        .forest
        .find(&NodeId::new("A"))
        .unwrap()
        .clone();
    assert!(a.is_deleted);
    assert_eq!(a.content, "[deleted]");
    assert_eq!(a.children.len(), 1);
    assert_eq!(a.children[0].content, "child survives");
}

#[tokio::test]
async fn happy_restore_round_trip() {
    let engine = engine_with(seeded_backend()).await;

    engine
        .dispatch(MutationRequest::Delete {
            key: key(),
            node: NodeId::new("C"),
        })
        .unwrap()
        .handle
        .settled()
        .await
        .unwrap();

    engine
        .dispatch(MutationRequest::Restore {
            key: key(),
            node: NodeId::new("C"),
        })
        .unwrap()
        .handle
        .settled()
        .await
        .unwrap();

    let c = engine
        .snapshot(&key())
        .unwrap()
        .forest
        .find(&NodeId::new("C"))
        .unwrap()
        .clone();
    assert!(!c.is_deleted);
}

#[tokio::test]
async fn happy_collapse_state_survives_refetch() {
    let engine = engine_with(seeded_backend()).await;

    assert!(engine.toggle_collapsed(&NodeId::new("A")));

    // Wholesale refetch replaces the partition; A recurs by id.
    engine.load(&key()).await.unwrap();

    let snapshot = engine.snapshot(&key()).unwrap();
    assert!(snapshot.is_collapsed(&NodeId::new("A")));
    assert!(!snapshot.is_collapsed(&NodeId::new("B")));
}

#[tokio::test]
async fn happy_reply_expands_collapsed_ancestors() {
    let engine = engine_with(seeded_backend()).await;

    engine.toggle_collapsed(&NodeId::new("A"));
    assert!(engine.is_collapsed(&NodeId::new("A")));

    let ack = engine
        .dispatch(MutationRequest::Create {
            key: key(),
            parent: Some(NodeId::new("A")),
            author: author(),
            content: "visible reply".into(),
        })
        .unwrap();

    // The new reply must be visible without manual expansion.
    assert!(!engine.is_collapsed(&NodeId::new("A")));
    ack.handle.settled().await.unwrap();
}

#[tokio::test]
async fn happy_viewer_partitions_are_isolated() {
    let backend = seeded_backend();
    let engine = Arc::new(CommentEngine::new(CommentEngineConfig::default(), backend));
    let v1 = key_for("v1", SortMode::Newest);
    let v2 = key_for("v2", SortMode::Newest);
    engine.load(&v1).await.unwrap();
    engine.load(&v2).await.unwrap();

    engine
        .dispatch(MutationRequest::LikeToggle {
            key: v1.clone(),
            node: NodeId::new("A"),
        })
        .unwrap()
        .handle
        .settled()
        .await
        .unwrap();

    // v1 sees the like; v2's partition is untouched.
    assert!(
        engine
            .snapshot(&v1)
            .unwrap()
            .forest
            .find(&NodeId::new("A"))
            .unwrap()
            .viewer_has_liked
    );
    assert!(
        !engine
            .snapshot(&v2)
            .unwrap()
            .forest
            .find(&NodeId::new("A"))
            .unwrap()
            .viewer_has_liked
    );
}

#[tokio::test]
async fn happy_reconciliation_follows_node_after_sort_switch() {
    let backend = seeded_backend();
    backend.put_forest(
        TargetType::Post,
        "post-1",
        SortMode::Top,
        vec![comment("A", "comment a", 2)],
    );
    backend.hold(Op::Like);
    backend.respond_like(LikeOutcome {
        like_count: 9,
        viewer_has_liked: true,
    });
    let engine = engine_with(Arc::clone(&backend)).await;

    let ack = engine
        .dispatch(MutationRequest::LikeToggle {
            key: key(),
            node: NodeId::new("A"),
        })
        .unwrap();

    // The viewer switches ordering while the like is in flight.
    engine.evict(&key());
    let top = key().with_sort(SortMode::Top);
    engine.load(&top).await.unwrap();

    backend.release(Op::Like);
    ack.handle.settled().await.unwrap();

    // The confirmation lands in the partition that now holds the node.
    let a = engine
        .snapshot(&top)
        .unwrap()
        .forest
        .find(&NodeId::new("A"))
        .unwrap()
        .clone();
    assert_eq!(a.like_count, 9);
    assert!(a.viewer_has_liked);
}

// =============================================================================
// Failure Scenarios - Rollback, Conflicts, Races
// =============================================================================

#[tokio::test]
async fn failure_delete_rolls_back_exactly_on_server_error() {
    let backend = seeded_backend();
    backend.fail_next(
        Op::Delete,
        RemoteError::Rejected {
            code: 500,
            message: "internal error".into(),
        },
    );
    let engine = engine_with(backend).await;

    let before = engine.snapshot(&key()).unwrap().forest;

    let ack = engine
        .dispatch(MutationRequest::Delete {
            key: key(),
            node: NodeId::new("C"),
        })
        .unwrap();
    // Optimistically deleted.
    assert!(ack.forest.find(&NodeId::new("C")).unwrap().is_deleted);

    let err = ack.handle.settled().await.unwrap_err();
    assert!(matches!(err, EngineError::Transient(_)));

    // Reverted to the exact pre-delete shape.
    let after = engine.snapshot(&key()).unwrap().forest;
    assert_eq!(*after, *before);
}

#[tokio::test]
async fn failure_create_rollback_removes_provisional_node() {
    let backend = seeded_backend();
    backend.fail_next(Op::Create, RemoteError::Transport("connection reset".into()));
    let engine = engine_with(backend).await;

    let before = engine.snapshot(&key()).unwrap().forest;

    let ack = engine
        .dispatch(MutationRequest::Create {
            key: key(),
            parent: Some(NodeId::new("A")),
            author: author(),
            content: "doomed".into(),
        })
        .unwrap();

    assert!(matches!(
        ack.handle.settled().await,
        Err(EngineError::Transient(_))
    ));

    let after = engine.snapshot(&key()).unwrap().forest;
    assert_eq!(*after, *before);
}

#[tokio::test]
async fn failure_second_mutation_on_same_node_is_rejected_synchronously() {
    let backend = seeded_backend();
    backend.hold(Op::Like);
    let engine = engine_with(Arc::clone(&backend)).await;

    let ack = engine
        .dispatch(MutationRequest::LikeToggle {
            key: key(),
            node: NodeId::new("A"),
        })
        .unwrap();

    let forest_while_pending = engine.snapshot(&key()).unwrap().forest;

    // Not queued, not dropped: rejected.
    let err = engine
        .dispatch(MutationRequest::Delete {
            key: key(),
            node: NodeId::new("A"),
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::ConflictPending { .. }));

    // The rejection did not touch the forest.
    let forest_after_reject = engine.snapshot(&key()).unwrap().forest;
    assert_eq!(*forest_after_reject, *forest_while_pending);

    // Once the first settles, the node is free again.
    backend.release(Op::Like);
    ack.handle.settled().await.unwrap();
    engine
        .dispatch(MutationRequest::Delete {
            key: key(),
            node: NodeId::new("A"),
        })
        .unwrap()
        .handle
        .settled()
        .await
        .unwrap();
}

#[tokio::test]
async fn failure_mutations_on_disjoint_nodes_run_concurrently() {
    let backend = seeded_backend();
    backend.hold(Op::Like);
    let engine = engine_with(Arc::clone(&backend)).await;

    let like_a = engine
        .dispatch(MutationRequest::LikeToggle {
            key: key(),
            node: NodeId::new("A"),
        })
        .unwrap();

    // A different node is not blocked by A's pending like.
    let delete_b = engine
        .dispatch(MutationRequest::Delete {
            key: key(),
            node: NodeId::new("B"),
        })
        .unwrap();
    delete_b.handle.settled().await.unwrap();

    backend.release(Op::Like);
    like_a.handle.settled().await.unwrap();

    let forest = engine.snapshot(&key()).unwrap().forest;
    assert!(forest.find(&NodeId::new("B")).unwrap().is_deleted);
    assert!(forest.find(&NodeId::new("A")).unwrap().viewer_has_liked);
}

#[tokio::test]
async fn failure_settle_into_invalidated_viewer_is_benign() {
    let backend = seeded_backend();
    backend.hold(Op::Delete);
    let engine = engine_with(Arc::clone(&backend)).await;

    let ack = engine
        .dispatch(MutationRequest::Delete {
            key: key(),
            node: NodeId::new("B"),
        })
        .unwrap();

    // Logout while the delete is in flight.
    engine.invalidate_viewer(&ViewerId::new("v1"));

    backend.release(Op::Delete);
    // The network call still completes; reconciliation is a no-op, not an error.
    ack.handle.settled().await.unwrap();
    assert!(engine.snapshot(&key()).is_none());
    assert_eq!(engine.stats().pending_mutations, 0);
}

#[tokio::test]
async fn failure_edit_of_deleted_comment_is_rejected() {
    let engine = engine_with(seeded_backend()).await;

    engine
        .dispatch(MutationRequest::Delete {
            key: key(),
            node: NodeId::new("B"),
        })
        .unwrap()
        .handle
        .settled()
        .await
        .unwrap();

    let err = engine
        .dispatch(MutationRequest::Edit {
            key: key(),
            node: NodeId::new("B"),
            content: "necromancy".into(),
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));
}
