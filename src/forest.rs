//! Persistent comment forest with structure-sharing updates.
//!
//! A [`CommentForest`] is an ordered list of root comment trees for one cache
//! partition. All updates are copy-on-write: the path from a root down to the
//! touched node is rebuilt, and every subtree off that path is reused by
//! reference ([`Arc`] clone). Update cost is therefore proportional to the
//! depth of the target, not the size of the forest, and readers holding an
//! older snapshot are never disturbed.
//!
//! ```text
//!        before                 after update(C)
//!          A                        A'
//!         / \                      / \
//!        B   C        ──►         B   C'      B is the SAME Arc in
//!           / \                      / \      both snapshots.
//!          D   E                    D   E     So are D and E.
//! ```
//!
//! Misses are reported, never panicked on: updating a node that is not in the
//! forest returns the forest unchanged plus [`TreeOutcome::NotFound`]. Depth
//! is unbounded; render-depth cutoffs are a presentation concern.

use std::sync::Arc;

use serde::Serialize;

use crate::node::{CommentNode, MutationId, NodeId};

/// Where a new node lands in its sibling list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Head,
    Tail,
}

/// Whether a tree operation found its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeOutcome {
    Applied,
    NotFound,
}

impl TreeOutcome {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// What to do with a matched node during a rewrite.
enum Edit {
    Replace(CommentNode),
    Remove,
}

/// An ordered forest of comment trees for one cache partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommentForest {
    pub roots: Vec<Arc<CommentNode>>,
}

impl CommentForest {
    #[must_use]
    pub fn new(roots: Vec<CommentNode>) -> Self {
        Self {
            roots: roots.into_iter().map(Arc::new).collect(),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of root comments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Total node count across all trees.
    #[must_use]
    pub fn total_nodes(&self) -> usize {
        self.roots.iter().map(|r| r.subtree_len()).sum()
    }

    /// Depth-first lookup by id.
    #[must_use]
    pub fn find(&self, id: &NodeId) -> Option<&Arc<CommentNode>> {
        find_in(&self.roots, &|n| n.id == *id)
    }

    /// Depth-first lookup by provisional mutation marker.
    #[must_use]
    pub fn find_by_marker(&self, mutation_id: &MutationId) -> Option<&Arc<CommentNode>> {
        find_in(&self.roots, &|n| n.provisional == Some(*mutation_id))
    }

    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.find(id).is_some()
    }

    /// Ids on the path from a root down to (and including) the target node.
    #[must_use]
    pub fn path_to(&self, id: &NodeId) -> Option<Vec<NodeId>> {
        let mut path = Vec::new();
        if path_in(&self.roots, id, &mut path) {
            path.reverse();
            Some(path)
        } else {
            None
        }
    }

    /// Replace the node with the given id by `update(old)`.
    ///
    /// Returns the new forest and whether the target was found. On a miss the
    /// returned forest is a cheap clone of self (all roots shared).
    #[must_use]
    pub fn update_node<F>(&self, id: &NodeId, update: F) -> (Self, TreeOutcome)
    where
        F: Fn(&CommentNode) -> CommentNode,
    {
        self.rewrite(&|n| n.id == *id, &|n| Edit::Replace(update(n)))
    }

    /// Replace the node carrying the given provisional marker.
    ///
    /// Used by reconciliation: the marker survives even if the node's
    /// temporary id or its ancestors changed while the mutation was in
    /// flight, so the substitution lands on the current forest.
    #[must_use]
    pub fn update_by_marker<F>(&self, mutation_id: &MutationId, update: F) -> (Self, TreeOutcome)
    where
        F: Fn(&CommentNode) -> CommentNode,
    {
        self.rewrite(&|n| n.provisional == Some(*mutation_id), &|n| {
            Edit::Replace(update(n))
        })
    }

    /// Remove the node carrying the given provisional marker (create rollback).
    /// Its children are removed with it; a provisional node can only have
    /// provisional descendants, and those cannot exist while their parent's
    /// creation is still pending.
    #[must_use]
    pub fn remove_by_marker(&self, mutation_id: &MutationId) -> (Self, TreeOutcome) {
        self.rewrite(&|n| n.provisional == Some(*mutation_id), &|_| Edit::Remove)
    }

    /// Insert a child under `parent` (or at the root level for `None`), at
    /// the head or tail of the sibling list.
    #[must_use]
    pub fn insert_child(
        &self,
        parent: Option<&NodeId>,
        node: CommentNode,
        position: InsertPosition,
    ) -> (Self, TreeOutcome) {
        let node = Arc::new(node);
        match parent {
            None => {
                let mut roots = Vec::with_capacity(self.roots.len() + 1);
                match position {
                    InsertPosition::Head => {
                        roots.push(node);
                        roots.extend(self.roots.iter().cloned());
                    }
                    InsertPosition::Tail => {
                        roots.extend(self.roots.iter().cloned());
                        roots.push(node);
                    }
                }
                (Self { roots }, TreeOutcome::Applied)
            }
            Some(parent_id) => match insert_under(&self.roots, parent_id, &node, position) {
                Some(roots) => (Self { roots }, TreeOutcome::Applied),
                None => (self.shared_clone(), TreeOutcome::NotFound),
            },
        }
    }

    fn rewrite(
        &self,
        matches: &dyn Fn(&CommentNode) -> bool,
        edit: &dyn Fn(&CommentNode) -> Edit,
    ) -> (Self, TreeOutcome) {
        match rewrite_in(&self.roots, matches, edit) {
            Some(roots) => (Self { roots }, TreeOutcome::Applied),
            None => (self.shared_clone(), TreeOutcome::NotFound),
        }
    }

    /// A clone that shares every root by reference.
    pub(crate) fn shared_clone(&self) -> Self {
        Self {
            roots: self.roots.clone(),
        }
    }
}

fn find_in<'a>(
    nodes: &'a [Arc<CommentNode>],
    matches: &dyn Fn(&CommentNode) -> bool,
) -> Option<&'a Arc<CommentNode>> {
    for node in nodes {
        if matches(node) {
            return Some(node);
        }
        if let Some(found) = find_in(&node.children, matches) {
            return Some(found);
        }
    }
    None
}

/// Pushes the path (target first, root last) into `path` on a hit.
fn path_in(nodes: &[Arc<CommentNode>], id: &NodeId, path: &mut Vec<NodeId>) -> bool {
    for node in nodes {
        if node.id == *id {
            path.push(node.id.clone());
            return true;
        }
        if path_in(&node.children, id, path) {
            path.push(node.id.clone());
            return true;
        }
    }
    false
}

/// Rebuild the sibling list containing the matched node, sharing everything
/// off the path. `None` means no match anywhere below `nodes`.
fn rewrite_in(
    nodes: &[Arc<CommentNode>],
    matches: &dyn Fn(&CommentNode) -> bool,
    edit: &dyn Fn(&CommentNode) -> Edit,
) -> Option<Vec<Arc<CommentNode>>> {
    for (idx, node) in nodes.iter().enumerate() {
        if matches(node) {
            let mut out = Vec::with_capacity(nodes.len());
            out.extend(nodes[..idx].iter().cloned());
            match edit(node) {
                Edit::Replace(replacement) => out.push(Arc::new(replacement)),
                Edit::Remove => {}
            }
            out.extend(nodes[idx + 1..].iter().cloned());
            return Some(out);
        }
        if let Some(children) = rewrite_in(&node.children, matches, edit) {
            let mut rebuilt = (**node).clone();
            rebuilt.children = children;
            let mut out = Vec::with_capacity(nodes.len());
            out.extend(nodes[..idx].iter().cloned());
            out.push(Arc::new(rebuilt));
            out.extend(nodes[idx + 1..].iter().cloned());
            return Some(out);
        }
    }
    None
}

fn insert_under(
    nodes: &[Arc<CommentNode>],
    parent_id: &NodeId,
    child: &Arc<CommentNode>,
    position: InsertPosition,
) -> Option<Vec<Arc<CommentNode>>> {
    for (idx, node) in nodes.iter().enumerate() {
        let rebuilt = if node.id == *parent_id {
            let mut rebuilt = (**node).clone();
            match position {
                InsertPosition::Head => rebuilt.children.insert(0, Arc::clone(child)),
                InsertPosition::Tail => rebuilt.children.push(Arc::clone(child)),
            }
            rebuilt
        } else if let Some(children) = insert_under(&node.children, parent_id, child, position) {
            let mut rebuilt = (**node).clone();
            rebuilt.children = children;
            rebuilt
        } else {
            continue;
        };

        let mut out = Vec::with_capacity(nodes.len());
        out.extend(nodes[..idx].iter().cloned());
        out.push(Arc::new(rebuilt));
        out.extend(nodes[idx + 1..].iter().cloned());
        return Some(out);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::AuthorRef;

    fn author() -> AuthorRef {
        AuthorRef::new("u1", "Ada")
    }

    fn node(id: &str, parent: Option<&str>) -> CommentNode {
        CommentNode::new(
            NodeId::new(id),
            parent.map(NodeId::new),
            author(),
            format!("body of {id}"),
        )
    }

    /// Builds:
    /// ```text
    /// a        d
    /// ├── b
    /// │   └── c
    /// ```
    fn sample_forest() -> CommentForest {
        let mut a = node("a", None);
        let mut b = node("b", Some("a"));
        let c = node("c", Some("b"));
        b.children.push(Arc::new(c));
        a.children.push(Arc::new(b));
        let d = node("d", None);
        CommentForest::new(vec![a, d])
    }

    #[test]
    fn test_find_and_contains() {
        let forest = sample_forest();
        assert!(forest.contains(&NodeId::new("c")));
        assert!(forest.contains(&NodeId::new("d")));
        assert!(!forest.contains(&NodeId::new("zz")));
        assert_eq!(forest.find(&NodeId::new("b")).unwrap().content, "body of b");
    }

    #[test]
    fn test_total_nodes() {
        assert_eq!(sample_forest().total_nodes(), 4);
    }

    #[test]
    fn test_path_to() {
        let forest = sample_forest();
        let path = forest.path_to(&NodeId::new("c")).unwrap();
        assert_eq!(
            path,
            vec![NodeId::new("a"), NodeId::new("b"), NodeId::new("c")]
        );
        assert!(forest.path_to(&NodeId::new("zz")).is_none());
    }

    #[test]
    fn test_update_rebuilds_path_only() {
        let forest = sample_forest();
        let (updated, outcome) = forest.update_node(&NodeId::new("c"), |n| {
            let mut n = n.clone();
            n.like_count = 9;
            n
        });

        assert!(outcome.is_applied());
        assert_eq!(updated.find(&NodeId::new("c")).unwrap().like_count, 9);

        // Path a -> b -> c was rebuilt.
        assert!(!Arc::ptr_eq(&forest.roots[0], &updated.roots[0]));
        // Sibling root d is shared by reference.
        assert!(Arc::ptr_eq(&forest.roots[1], &updated.roots[1]));
        // Old snapshot untouched.
        assert_eq!(forest.find(&NodeId::new("c")).unwrap().like_count, 0);
    }

    #[test]
    fn test_update_miss_returns_unchanged() {
        let forest = sample_forest();
        let (same, outcome) = forest.update_node(&NodeId::new("zz"), |n| n.clone());

        assert_eq!(outcome, TreeOutcome::NotFound);
        assert_eq!(same.roots.len(), forest.roots.len());
        for (a, b) in forest.roots.iter().zip(same.roots.iter()) {
            assert!(Arc::ptr_eq(a, b));
        }
    }

    #[test]
    fn test_insert_child_head() {
        let forest = sample_forest();
        let reply = node("r", Some("b"));
        let (updated, outcome) =
            forest.insert_child(Some(&NodeId::new("b")), reply, InsertPosition::Head);

        assert!(outcome.is_applied());
        let b = updated.find(&NodeId::new("b")).unwrap();
        assert_eq!(b.children[0].id, NodeId::new("r"));
        assert_eq!(b.children[1].id, NodeId::new("c"));
        // Untouched root shared.
        assert!(Arc::ptr_eq(&forest.roots[1], &updated.roots[1]));
    }

    #[test]
    fn test_insert_top_level_head_and_tail() {
        let forest = sample_forest();

        let (head, _) = forest.insert_child(None, node("new", None), InsertPosition::Head);
        assert_eq!(head.roots[0].id, NodeId::new("new"));

        let (tail, _) = forest.insert_child(None, node("new", None), InsertPosition::Tail);
        assert_eq!(tail.roots.last().unwrap().id, NodeId::new("new"));
        // Existing roots shared in both cases.
        assert!(Arc::ptr_eq(&forest.roots[0], &head.roots[1]));
        assert!(Arc::ptr_eq(&forest.roots[0], &tail.roots[0]));
    }

    #[test]
    fn test_insert_under_missing_parent() {
        let forest = sample_forest();
        let (same, outcome) =
            forest.insert_child(Some(&NodeId::new("zz")), node("r", None), InsertPosition::Head);
        assert_eq!(outcome, TreeOutcome::NotFound);
        assert_eq!(same.total_nodes(), forest.total_nodes());
    }

    #[test]
    fn test_marker_lookup_and_replacement_keeps_position() {
        let forest = sample_forest();
        let mutation = MutationId::new();
        let provisional =
            CommentNode::provisional(mutation, Some(NodeId::new("b")), author(), "pending");
        let (forest, _) =
            forest.insert_child(Some(&NodeId::new("b")), provisional, InsertPosition::Head);

        assert!(forest.find_by_marker(&mutation).is_some());

        let (confirmed, outcome) = forest.update_by_marker(&mutation, |n| {
            let mut n = n.clone();
            n.id = NodeId::new("77");
            n.provisional = None;
            n
        });

        assert!(outcome.is_applied());
        let b = confirmed.find(&NodeId::new("b")).unwrap();
        // Same head position, real id, marker gone.
        assert_eq!(b.children[0].id, NodeId::new("77"));
        assert!(!b.children[0].is_provisional());
        assert!(confirmed.find_by_marker(&mutation).is_none());
    }

    #[test]
    fn test_remove_by_marker() {
        let forest = sample_forest();
        let mutation = MutationId::new();
        let provisional = CommentNode::provisional(mutation, None, author(), "pending");
        let (forest, _) = forest.insert_child(None, provisional, InsertPosition::Head);
        assert_eq!(forest.roots.len(), 3);

        let (rolled_back, outcome) = forest.remove_by_marker(&mutation);
        assert!(outcome.is_applied());
        assert_eq!(rolled_back.roots.len(), 2);
        assert!(rolled_back.find_by_marker(&mutation).is_none());
    }

    #[test]
    fn test_deep_nesting_is_unbounded() {
        let mut forest = CommentForest::new(vec![node("0", None)]);
        let mut parent = NodeId::new("0");
        for depth in 1..200 {
            let id = depth.to_string();
            let child = node(&id, Some(parent.as_str()));
            let (next, outcome) = forest.insert_child(Some(&parent), child, InsertPosition::Tail);
            assert!(outcome.is_applied());
            forest = next;
            parent = NodeId::new(id);
        }
        assert_eq!(forest.total_nodes(), 200);
        assert_eq!(forest.path_to(&parent).unwrap().len(), 200);
    }
}
