//! # Link Chaser
//!
//! Follows `extend` pointers of plain-link, jump-to and placeholder nodes
//! to the node that should actually be dispatched.
//!
//! Operator data may contain cycles. A chase never fails: when a pointer
//! leads back to a node already visited, the chaser walks up the parent
//! chain of the node where the cycle closed and returns the first
//! ancestor whose own chase lands on an existing node. If no ancestor
//! qualifies the result is the root sentinel.
//!
//! Every step visits a new node, so a chase is bounded by the graph size.

use crate::{Node, NodeGraph, NodeId};
use std::collections::BTreeSet;

/// Resolves indirection chains over one graph snapshot.
pub struct LinkChaser<'a> {
    graph: &'a NodeGraph,
}

impl<'a> LinkChaser<'a> {
    #[must_use]
    pub fn new(graph: &'a NodeGraph) -> Self {
        Self { graph }
    }

    /// Terminal node for `id`.
    ///
    /// - no meaningful `extend`: `id` itself
    /// - chain ends on a non-indirect (or unknown) node: that node
    /// - cycle: an ancestor's terminal, or `NodeId::ROOT`
    #[must_use]
    pub fn chase(&self, id: NodeId) -> NodeId {
        let mut visited = BTreeSet::new();
        self.chase_from(id, &mut visited)
    }

    fn chase_from(&self, start: NodeId, visited: &mut BTreeSet<NodeId>) -> NodeId {
        let mut current = start;
        loop {
            visited.insert(current);
            let Some(target) = self
                .graph
                .get(current)
                .and_then(Node::indirection_target)
            else {
                return current;
            };
            if visited.contains(&target) {
                tracing::warn!(node = %current, extend = %target, "cyclic extend, escaping through parents");
                return self.escape_cycle(current, visited);
            }
            current = target;
        }
    }

    fn escape_cycle(&self, id: NodeId, visited: &mut BTreeSet<NodeId>) -> NodeId {
        for ancestor in self.graph.ancestors(id) {
            if visited.contains(&ancestor) {
                continue;
            }
            let terminal = self.chase_from(ancestor, visited);
            if !terminal.is_root() && self.graph.contains(terminal) {
                return terminal;
            }
        }
        NodeId::ROOT
    }
}

// =============================================================================
// TESTS
// =============================================================================
