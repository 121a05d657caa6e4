//! # Resolver
//!
//! Turns a raw request URI into the node to dispatch.
//!
//! ## Order
//!
//! 1. Strip the configured base path and split off the query string
//! 2. Empty path: front page for the requester's auth state
//! 3. `index.php?m=<id>`: direct node id if present in the role's graph
//! 4. Route table match, then one retry with the URL suffix stripped
//!    (a bare `index.php` without `m` is routed like any other path)
//!
//! Failures are classified against the unfiltered graph: a node that
//! exists outside the role's permissions is forbidden (authenticated) or
//! unauthenticated (anonymous); anything else is not found.

use crate::builder::GraphBuilder;
use crate::config::SiteConfig;
use crate::primitives::{LEGACY_NODE_PARAM, LEGACY_SCRIPT};
use crate::route::RouteParams;
use crate::{AccessFault, NodeGraph, NodeId, RequestContext, SiteError};

/// Successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub node: NodeId,
    /// Route captures (plus descriptor defaults).
    pub captures: RouteParams,
    /// Decoded query string pairs in request order.
    pub query: Vec<(String, String)>,
}

/// Resolves request URIs against one role's graph.
pub struct Resolver<'a> {
    graph: &'a NodeGraph,
    builder: &'a GraphBuilder<'a>,
    config: &'a SiteConfig,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(graph: &'a NodeGraph, builder: &'a GraphBuilder<'a>, config: &'a SiteConfig) -> Self {
        Self {
            graph,
            builder,
            config,
        }
    }

    /// Resolve the request's URI.
    ///
    /// Access faults are returned as `SiteError::Halted`; other errors come
    /// from the collaborators consulted during classification.
    pub fn resolve(&self, request: &RequestContext) -> Result<Resolution, SiteError> {
        let (raw_path, raw_query) = request
            .raw_uri
            .split_once('?')
            .unwrap_or((request.raw_uri.as_str(), ""));
        let path = self.strip_base(raw_path).trim_matches('/');
        let query = parse_query(raw_query);

        let legacy = (path == LEGACY_SCRIPT)
            .then(|| query.iter().find(|(k, _)| k == LEGACY_NODE_PARAM))
            .flatten()
            .map(|(_, v)| v.as_str());

        let resolved = if path.is_empty() {
            self.direct(self.config.front_page_for(request.authenticated), request)
        } else if let Some(raw) = legacy {
            match NodeId::parse(raw) {
                Some(id) => self.direct(id, request),
                None => Err(not_found(path)),
            }
        } else {
            self.routed(path, request)
        };

        let (node, captures) = resolved.inspect_err(|e| {
            tracing::debug!(uri = %request.raw_uri, role = %request.role, error = %e, "resolution failed");
        })?;
        tracing::debug!(uri = %request.raw_uri, role = %request.role, node = %node, "resolved");
        Ok(Resolution {
            node,
            captures,
            query,
        })
    }

    fn strip_base<'p>(&self, path: &'p str) -> &'p str {
        let base = self.config.base_path.trim_end_matches('/');
        if base.is_empty() {
            return path;
        }
        match path.strip_prefix(base) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => path,
        }
    }

    fn direct(
        &self,
        id: NodeId,
        request: &RequestContext,
    ) -> Result<(NodeId, RouteParams), SiteError> {
        if self.graph.contains(id) {
            Ok((id, RouteParams::new()))
        } else {
            Err(self.classify_id(id, &id.to_string(), request)?)
        }
    }

    fn routed(
        &self,
        path: &str,
        request: &RequestContext,
    ) -> Result<(NodeId, RouteParams), SiteError> {
        let stripped = self.strip_suffix(path);
        let found = self.graph.routes().match_path(path).or_else(|| {
            stripped.and_then(|p| self.graph.routes().match_path(p))
        });

        match found {
            Some(m) if self.graph.contains(m.catcher) => Ok((m.catcher, m.params)),
            Some(m) => Err(self.classify_id(m.catcher, path, request)?),
            None => Err(self.classify_path(path, stripped, request)?),
        }
    }

    fn strip_suffix<'p>(&self, path: &'p str) -> Option<&'p str> {
        let suffix = self.config.url_suffix.as_str();
        if suffix.is_empty() {
            return None;
        }
        path.strip_suffix(suffix).filter(|p| !p.is_empty())
    }

    fn classify_path(
        &self,
        path: &str,
        stripped: Option<&str>,
        request: &RequestContext,
    ) -> Result<SiteError, SiteError> {
        let unfiltered = self.builder.build_unfiltered()?;
        let found = unfiltered
            .routes()
            .match_path(path)
            .or_else(|| stripped.and_then(|p| unfiltered.routes().match_path(p)));

        Ok(match found {
            Some(m) if unfiltered.contains(m.catcher) => denied(m.catcher, request),
            _ => not_found(path),
        })
    }

    fn classify_id(
        &self,
        id: NodeId,
        path: &str,
        request: &RequestContext,
    ) -> Result<SiteError, SiteError> {
        let unfiltered = self.builder.build_unfiltered()?;
        Ok(if unfiltered.contains(id) {
            denied(id, request)
        } else {
            not_found(path)
        })
    }
}

fn denied(node: NodeId, request: &RequestContext) -> SiteError {
    if request.authenticated {
        SiteError::Halted(AccessFault::Forbidden { node })
    } else {
        SiteError::Halted(AccessFault::Unauthenticated { node })
    }
}

fn not_found(path: &str) -> SiteError {
    SiteError::Halted(AccessFault::NotFound {
        path: path.to_string(),
    })
}

fn parse_query(raw: &str) -> Vec<(String, String)> {
    if raw.is_empty() {
        return Vec::new();
    }
    serde_urlencoded::from_str(raw).unwrap_or_else(|e| {
        tracing::debug!(query = %raw, error = %e, "ignoring malformed query string");
        Vec::new()
    })
}

// =============================================================================
// TESTS
// =============================================================================
