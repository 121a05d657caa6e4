//! # Menus
//!
//! Navigation views over a role's graph: a depth-annotated menu tree, the
//! family (siblings) of a node and its breadcrumb trail.
//!
//! Subtrees are walked with an explicit worklist, so depth is bounded by
//! `MAX_TREE_DEPTH` rather than the call stack. A node whose `HideType`
//! hides it from the requester is skipped together with its subtree.

use crate::primitives::MAX_TREE_DEPTH;
use crate::{Node, NodeGraph, NodeId, NodeType};
use serde::Serialize;
use std::collections::BTreeSet;

/// One rendered menu entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub node: NodeId,
    pub name: String,
    pub href: String,
    pub node_type: NodeType,
    pub new_window: bool,
    /// 0 for the first level below the menu root.
    pub depth: usize,
}

impl MenuItem {
    fn from_node(node: &Node, depth: usize) -> Self {
        Self {
            node: node.id,
            name: node.name.clone(),
            href: node.href.clone(),
            node_type: node.node_type,
            new_window: node.new_window,
            depth,
        }
    }
}

/// Builds menus for one requester.
pub struct MenuBuilder<'a> {
    graph: &'a NodeGraph,
    /// `None` shows every node regardless of `HideType`.
    authenticated: Option<bool>,
}

impl<'a> MenuBuilder<'a> {
    /// Menus as seen by an (un)authenticated requester.
    #[must_use]
    pub fn new(graph: &'a NodeGraph, authenticated: bool) -> Self {
        Self {
            graph,
            authenticated: Some(authenticated),
        }
    }

    /// Menus including hidden nodes, for administration views.
    #[must_use]
    pub fn unfiltered(graph: &'a NodeGraph) -> Self {
        Self {
            graph,
            authenticated: None,
        }
    }

    fn shows(&self, node: &Node) -> bool {
        self.authenticated
            .is_none_or(|auth| node.hide_type.shows_for(auth))
    }

    /// Pre-order menu below `root`, limited to `max_depth` levels.
    #[must_use]
    pub fn menu(&self, root: NodeId, max_depth: Option<usize>) -> Vec<MenuItem> {
        let limit = max_depth.unwrap_or(MAX_TREE_DEPTH).min(MAX_TREE_DEPTH);
        let mut items = Vec::new();
        let mut visited = BTreeSet::from([root]);
        // Children pushed in reverse so the stack pops them in rank order.
        let mut stack: Vec<(NodeId, usize)> = self
            .graph
            .children_of(root)
            .iter()
            .rev()
            .map(|&id| (id, 0))
            .collect();

        while let Some((id, depth)) = stack.pop() {
            if depth >= limit || !visited.insert(id) {
                continue;
            }
            let Some(node) = self.graph.get(id) else {
                continue;
            };
            if !self.shows(node) {
                continue;
            }
            items.push(MenuItem::from_node(node, depth));
            stack.extend(
                self.graph
                    .children_of(id)
                    .iter()
                    .rev()
                    .map(|&child| (child, depth.saturating_add(1))),
            );
        }
        items
    }

    /// Visible siblings of `id`, including itself, in rank order.
    #[must_use]
    pub fn family(&self, id: NodeId) -> Vec<MenuItem> {
        let Some(node) = self.graph.get(id) else {
            return Vec::new();
        };
        self.graph
            .children_of(node.parent_id)
            .iter()
            .filter_map(|&sibling| self.graph.get(sibling))
            .filter(|sibling| self.shows(sibling))
            .map(|sibling| MenuItem::from_node(sibling, 0))
            .collect()
    }

    /// Trail from the top-level ancestor down to `id`.
    ///
    /// Breadcrumbs ignore `HideType`: a hidden parent still locates the page.
    #[must_use]
    pub fn breadcrumbs(&self, id: NodeId) -> Vec<MenuItem> {
        let mut trail: Vec<NodeId> = self.graph.ancestors(id);
        trail.reverse();
        trail.push(id);
        trail
            .into_iter()
            .filter_map(|n| self.graph.get(n))
            .enumerate()
            .map(|(depth, node)| MenuItem::from_node(node, depth))
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
