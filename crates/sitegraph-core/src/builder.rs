//! # Graph Builder
//!
//! Assembles a role's `NodeGraph` from permission-filtered rows and keeps
//! the serialized snapshot in the cache.
//!
//! ## Pipeline
//!
//! 1. Read rows visible to the role (or every row for the unfiltered graph)
//! 2. Sort by structural rank `(rank, node_id)`
//! 3. Per row: decode params, compute href, register adjacency, register
//!    alias, register alias/route descriptors
//! 4. Encode and store under `sitegraph:role:{role}` (`sitegraph:unfiltered`
//!    for the permission-free graph, which no role name can reach)
//!
//! A cached payload that fails to decode is a miss, never an error.

use crate::cache::GraphCache;
use crate::config::SiteConfig;
use crate::formats::{graph_from_bytes, graph_to_bytes};
use crate::graph::node_url;
use crate::primitives::{GRAPH_CACHE_PREFIX, ROLE_CACHE_NAMESPACE, UNFILTERED_CACHE_SUFFIX};
use crate::source::NodeSource;
use crate::{HideType, Node, NodeGraph, NodeId, NodeRow, NodeType, RoleId, SiteError};

/// Builds and caches node graphs.
///
/// All collaborators are handed in at construction.
pub struct GraphBuilder<'a> {
    source: &'a dyn NodeSource,
    cache: &'a dyn GraphCache,
    config: &'a SiteConfig,
}

impl<'a> GraphBuilder<'a> {
    #[must_use]
    pub fn new(source: &'a dyn NodeSource, cache: &'a dyn GraphCache, config: &'a SiteConfig) -> Self {
        Self {
            source,
            cache,
            config,
        }
    }

    /// Cache key of a role's graph; `None` addresses the unfiltered graph.
    #[must_use]
    pub fn cache_key(role: Option<&RoleId>) -> String {
        match role {
            Some(role) => format!("{}{}{}", GRAPH_CACHE_PREFIX, ROLE_CACHE_NAMESPACE, role),
            None => format!("{}{}", GRAPH_CACHE_PREFIX, UNFILTERED_CACHE_SUFFIX),
        }
    }

    /// The role's graph, from cache when a valid snapshot exists.
    pub fn build(&self, role: &RoleId) -> Result<NodeGraph, SiteError> {
        if role.is_empty() {
            return Err(SiteError::NoRole);
        }
        match self.load_cached(Some(role)) {
            Some(graph) => Ok(graph),
            None => self.rebuild(role),
        }
    }

    /// Rebuild the role's graph from rows and overwrite the cache.
    pub fn rebuild(&self, role: &RoleId) -> Result<NodeGraph, SiteError> {
        if role.is_empty() {
            return Err(SiteError::NoRole);
        }
        let rows = self.source.visible_rows(role)?;
        let graph = assemble(Some(role.clone()), rows, self.config);
        tracing::debug!(role = %role, nodes = graph.len(), routes = graph.routes().len(), "built node graph");
        self.store(Some(role), &graph);
        Ok(graph)
    }

    /// The permission-free graph, used to classify resolution failures.
    pub fn build_unfiltered(&self) -> Result<NodeGraph, SiteError> {
        if let Some(graph) = self.load_cached(None) {
            return Ok(graph);
        }
        let rows = self.source.all_rows()?;
        let graph = assemble(None, rows, self.config);
        tracing::debug!(nodes = graph.len(), "built unfiltered node graph");
        self.store(None, &graph);
        Ok(graph)
    }

    /// Drop one role's snapshot, or every snapshot.
    ///
    /// Flushing a role also drops the unfiltered graph, since any change
    /// that warrants a flush may have touched the node table.
    pub fn flush(&self, role: Option<&RoleId>) -> Result<(), SiteError> {
        match role {
            Some(role) => {
                self.cache.flush(Some(&Self::cache_key(Some(role))))?;
                self.cache.flush(Some(&Self::cache_key(None)))?;
            }
            None => self.cache.flush(None)?,
        }
        tracing::info!(role = ?role.map(RoleId::as_str), "flushed node graph cache");
        Ok(())
    }

    fn load_cached(&self, role: Option<&RoleId>) -> Option<NodeGraph> {
        let key = Self::cache_key(role);
        let blob = match self.cache.get(&key) {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "graph cache read failed, rebuilding");
                return None;
            }
        };
        match graph_from_bytes(&blob) {
            Ok(graph) if graph.role() == role => Some(graph),
            Ok(_) => {
                tracing::warn!(key = %key, "cached graph belongs to another role, rebuilding");
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cached graph unreadable, rebuilding");
                None
            }
        }
    }

    fn store(&self, role: Option<&RoleId>, graph: &NodeGraph) {
        let key = Self::cache_key(role);
        let result = graph_to_bytes(graph).and_then(|bytes| self.cache.set(&key, &bytes));
        if let Err(e) = result {
            tracing::warn!(key = %key, error = %e, "failed to cache node graph");
        }
    }
}

/// Assemble a graph from rows. Pure; identical rows give identical graphs.
pub fn assemble(role: Option<RoleId>, mut rows: Vec<NodeRow>, config: &SiteConfig) -> NodeGraph {
    rows.sort_by(|a, b| (a.rank, a.node_id).cmp(&(b.rank, b.node_id)));

    let mut graph = NodeGraph::new(role);
    for row in rows {
        let node = match node_from_row(row, config) {
            Ok(node) => node,
            Err(e) => {
                tracing::warn!(error = %e, "skipping node row");
                continue;
            }
        };
        register(&mut graph, node);
    }
    graph
}

fn node_from_row(row: NodeRow, config: &SiteConfig) -> Result<Node, SiteError> {
    let node_type = NodeType::try_from(row.node_type)?;
    let mut node = Node {
        id: NodeId(row.node_id),
        parent_id: NodeId(row.parent_node_id),
        name: row.node_name,
        link: row.node_link,
        plugin: row.plugin,
        node_type,
        extend: row.extend.map(NodeId),
        new_window: row.new_window,
        alias: row.alias.filter(|a| !a.trim().is_empty()),
        route: row.route.filter(|r| !r.trim().is_empty()),
        hide_type: HideType::from_code(row.hide),
        rank: row.rank,
        theme_folder: row.theme_id,
        layout: row.layout,
        params: decode_entities(&row.params),
        href: String::new(),
    };
    node.href = node_url(&node, &[], config);
    Ok(node)
}

fn register(graph: &mut NodeGraph, node: Node) {
    // Jump and placeholder aliases resolve to the node they stand for.
    let target = match node.extend {
        Some(extend) if node.node_type.forwards_alias() && !extend.is_root() => extend,
        _ => node.id,
    };

    if let Some(alias) = node.alias.as_deref() {
        if graph.aliases_mut().insert(alias, target) {
            graph.routes_mut().add_node_route(target, alias, None, None);
        } else {
            tracing::warn!(node = %node.id, alias = %alias, "duplicate alias ignored");
        }
    }

    if let Some(route) = node.route.as_deref() {
        let module = Some(node.plugin.as_str()).filter(|p| !p.is_empty());
        graph.routes_mut().add_node_route(target, route, module, None);
    }

    graph.insert_node(node);
}

/// Decode the HTML entities the node table stores params with.
///
/// Handles the named entities `quot`, `amp`, `lt`, `gt`, `apos` and
/// numeric `&#NN;` / `&#xHH;` forms. Anything else is kept verbatim.
pub fn decode_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&tail[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "quot" => Some('"'),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "apos" => Some('\''),
        _ => {
            let numeric = name.strip_prefix('#')?;
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
