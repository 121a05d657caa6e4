//! # Node Graph
//!
//! The immutable, per-role snapshot of the site tree.
//!
//! A `NodeGraph` holds every node a role may resolve, the parent -> children
//! adjacency in rank order, the alias index and the route table. It is
//! assembled by the `GraphBuilder`, serialized into the cache, and only read
//! afterwards. All maps are `BTreeMap`s so two builds over identical rows
//! encode to identical bytes.

use crate::alias::AliasIndex;
use crate::config::SiteConfig;
use crate::primitives::{LEGACY_NODE_PARAM, LEGACY_SCRIPT, MAX_TREE_DEPTH};
use crate::route::RouteTable;
use crate::{Node, NodeId, NodeType, RoleId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Snapshot of one role's site tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGraph {
    /// `None` for the permission-free graph.
    role: Option<RoleId>,
    nodes: BTreeMap<NodeId, Node>,
    /// Parent -> children in structural rank order.
    children: BTreeMap<NodeId, Vec<NodeId>>,
    aliases: AliasIndex,
    routes: RouteTable,
}

impl NodeGraph {
    /// Create an empty graph for a role (`None` = unfiltered).
    #[must_use]
    pub fn new(role: Option<RoleId>) -> Self {
        Self {
            role,
            ..Self::default()
        }
    }

    /// Add a node and register it under its parent.
    ///
    /// Called by the builder in structural order, which fixes sibling order.
    pub(crate) fn insert_node(&mut self, node: Node) {
        self.children.entry(node.parent_id).or_default().push(node.id);
        self.nodes.insert(node.id, node);
    }

    pub(crate) fn aliases_mut(&mut self) -> &mut AliasIndex {
        &mut self.aliases
    }

    pub(crate) fn routes_mut(&mut self) -> &mut RouteTable {
        &mut self.routes
    }

    /// Role this graph was built for.
    #[must_use]
    pub fn role(&self) -> Option<&RoleId> {
        self.role.as_ref()
    }

    /// Look up a node.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Check if the graph contains a node.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children of a node in rank order. `NodeId::ROOT` lists top-level nodes.
    #[must_use]
    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Ancestors of a node, nearest first, excluding the root sentinel.
    ///
    /// Stops at the first missing parent, at a repeated node, or after
    /// `MAX_TREE_DEPTH` steps.
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut seen = BTreeSet::from([id]);
        let mut current = self.nodes.get(&id).map(|n| n.parent_id);

        while let Some(parent) = current {
            if parent.is_root() || chain.len() >= MAX_TREE_DEPTH || !seen.insert(parent) {
                break;
            }
            let Some(node) = self.nodes.get(&parent) else {
                break;
            };
            chain.push(parent);
            current = Some(node.parent_id);
        }
        chain
    }

    /// The alias index.
    #[must_use]
    pub fn aliases(&self) -> &AliasIndex {
        &self.aliases
    }

    /// The route table.
    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// URL of a node with optional query parameters.
    ///
    /// Returns `None` for nodes outside the graph.
    #[must_use]
    pub fn build_url(
        &self,
        id: NodeId,
        params: &[(&str, &str)],
        config: &SiteConfig,
    ) -> Option<String> {
        self.get(id).map(|node| node_url(node, params, config))
    }
}

/// URL of a node in SEF or legacy form.
///
/// - SEF with alias: `{absoluteUrl}/{alias}{suffix}[?params]`
/// - otherwise: `{absoluteUrl}/index.php?m={id}[&params]`, where jump
///   nodes point at their `extend` target.
pub fn node_url(node: &Node, params: &[(&str, &str)], config: &SiteConfig) -> String {
    let base = config.base_url();
    let query = encode_query(params);

    match node.alias.as_deref().filter(|a| config.sef && !a.is_empty()) {
        Some(alias) => {
            let mut url = format!("{}/{}{}", base, alias.trim_matches('/'), config.url_suffix);
            if !query.is_empty() {
                url.push('?');
                url.push_str(&query);
            }
            url
        }
        None => {
            let target = match (node.node_type, node.extend) {
                (NodeType::JumpTo, Some(extend)) if !extend.is_root() => extend,
                _ => node.id,
            };
            let mut url = format!(
                "{}/{}?{}={}",
                base, LEGACY_SCRIPT, LEGACY_NODE_PARAM, target
            );
            if !query.is_empty() {
                url.push('&');
                url.push_str(&query);
            }
            url
        }
    }
}

fn encode_query(params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return String::new();
    }
    serde_urlencoded::to_string(params).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "dropping unencodable url parameters");
        String::new()
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HideType;

    fn node(id: u64, parent: u64, node_type: NodeType, alias: Option<&str>) -> Node {
        Node {
            id: NodeId(id),
            parent_id: NodeId(parent),
            name: format!("node {}", id),
            link: String::new(),
            plugin: String::new(),
            node_type,
            extend: None,
            new_window: false,
            alias: alias.map(str::to_string),
            route: None,
            hide_type: HideType::Visible,
            rank: 0,
            theme_folder: String::new(),
            layout: String::new(),
            params: String::new(),
            href: String::new(),
        }
    }

    fn config(sef: bool) -> SiteConfig {
        SiteConfig {
            absolute_url: "https://example.org".to_string(),
            sef,
            ..SiteConfig::default()
        }
    }

    #[test]
    fn build_url_sef_uses_alias() {
        let mut graph = NodeGraph::new(None);
        graph.insert_node(node(9, 0, NodeType::StandardPage, Some("about")));

        assert_eq!(
            graph.build_url(NodeId(9), &[], &config(true)).as_deref(),
            Some("https://example.org/about")
        );
    }

    #[test]
    fn build_url_legacy_form() {
        let mut graph = NodeGraph::new(None);
        graph.insert_node(node(9, 0, NodeType::StandardPage, Some("about")));

        assert_eq!(
            graph.build_url(NodeId(9), &[], &config(false)).as_deref(),
            Some("https://example.org/index.php?m=9")
        );
    }

    #[test]
    fn build_url_appends_params_and_suffix() {
        let mut graph = NodeGraph::new(None);
        graph.insert_node(node(9, 0, NodeType::StandardPage, Some("about")));
        let mut cfg = config(true);
        cfg.url_suffix = ".html".to_string();

        assert_eq!(
            graph
                .build_url(NodeId(9), &[("tab", "team")], &cfg)
                .as_deref(),
            Some("https://example.org/about.html?tab=team")
        );
        assert_eq!(
            graph
                .build_url(NodeId(9), &[("tab", "team")], &config(false))
                .as_deref(),
            Some("https://example.org/index.php?m=9&tab=team")
        );
    }

    #[test]
    fn legacy_jump_url_points_at_target() {
        let mut jump = node(4, 0, NodeType::JumpTo, None);
        jump.extend = Some(NodeId(12));

        assert_eq!(
            node_url(&jump, &[], &config(false)),
            "https://example.org/index.php?m=12"
        );
    }

    #[test]
    fn build_url_unknown_node() {
        let graph = NodeGraph::new(None);
        assert_eq!(graph.build_url(NodeId(1), &[], &config(true)), None);
    }

    #[test]
    fn children_keep_insertion_order() {
        let mut graph = NodeGraph::new(None);
        graph.insert_node(node(5, 0, NodeType::StandardPage, None));
        graph.insert_node(node(3, 0, NodeType::StandardPage, None));
        graph.insert_node(node(8, 5, NodeType::StandardPage, None));

        assert_eq!(graph.children_of(NodeId::ROOT), &[NodeId(5), NodeId(3)]);
        assert_eq!(graph.children_of(NodeId(5)), &[NodeId(8)]);
        assert!(graph.children_of(NodeId(8)).is_empty());
    }

    #[test]
    fn ancestors_nearest_first() {
        let mut graph = NodeGraph::new(None);
        graph.insert_node(node(1, 0, NodeType::StandardPage, None));
        graph.insert_node(node(2, 1, NodeType::StandardPage, None));
        graph.insert_node(node(3, 2, NodeType::StandardPage, None));

        assert_eq!(graph.ancestors(NodeId(3)), vec![NodeId(2), NodeId(1)]);
        assert!(graph.ancestors(NodeId(1)).is_empty());
    }

    #[test]
    fn ancestors_stop_on_parent_cycle() {
        let mut graph = NodeGraph::new(None);
        graph.insert_node(node(1, 2, NodeType::StandardPage, None));
        graph.insert_node(node(2, 1, NodeType::StandardPage, None));

        assert_eq!(graph.ancestors(NodeId(1)), vec![NodeId(2)]);
    }
}
