//! # Route Table
//!
//! Ordered registry of route descriptors and the path matching algorithm.
//!
//! Patterns are `/`-delimited. A segment of the exact form `<:name>`
//! captures one path segment; every other segment is literal. Routes are
//! tried in declaration order and the first full match wins. There is no
//! specificity scoring.
//!
//! A path whose first segment names a registered module (and that has
//! further segments) is matched only against that module's routes, with
//! the module segment consumed.

use crate::NodeId;
use crate::primitives::{CAPTURE_CLOSE, CAPTURE_OPEN, MAX_PATH_SEGMENTS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Captured route parameters, keyed by capture name.
pub type RouteParams = BTreeMap<String, String>;

/// One registered route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDescriptor {
    /// Node that handles a match.
    pub catcher: NodeId,
    pub pattern: String,
    pub module: Option<String>,
    /// Parameters present on every match unless a capture overrides them.
    pub defaults: Option<RouteParams>,
}

/// Result of a reentrant match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub catcher: NodeId,
    pub params: RouteParams,
}

/// Ordered route registry.
///
/// `match_route` records its captures in a single slot read back through
/// `parameters()`. The slot is only overwritten by the next successful
/// match, so read it right after matching. `match_path` returns the
/// captures by value and leaves the slot alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    routes: Vec<RouteDescriptor>,
    /// Module name -> indices into `routes`, in declaration order.
    modules: BTreeMap<String, Vec<usize>>,
    #[serde(skip)]
    captures: RouteParams,
}

impl RouteTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route.
    ///
    /// Returns `false` and changes nothing when the catcher or pattern is
    /// empty, or when the catcher is not a node id.
    pub fn add_route(
        &mut self,
        catcher: &str,
        pattern: &str,
        module: Option<&str>,
        defaults: Option<RouteParams>,
    ) -> bool {
        if catcher.trim().is_empty() || pattern.trim().is_empty() {
            return false;
        }
        let Some(catcher) = NodeId::parse(catcher) else {
            return false;
        };
        self.push(RouteDescriptor {
            catcher,
            pattern: pattern.to_string(),
            module: module.filter(|m| !m.is_empty()).map(str::to_string),
            defaults,
        });
        true
    }

    /// Register a route for a known node id.
    pub fn add_node_route(
        &mut self,
        catcher: NodeId,
        pattern: &str,
        module: Option<&str>,
        defaults: Option<RouteParams>,
    ) -> bool {
        self.add_route(&catcher.to_string(), pattern, module, defaults)
    }

    fn push(&mut self, descriptor: RouteDescriptor) {
        let index = self.routes.len();
        if let Some(module) = &descriptor.module {
            self.modules.entry(module.clone()).or_default().push(index);
        }
        self.routes.push(descriptor);
    }

    /// Match a path, storing the captures for `parameters()`.
    pub fn match_route(&mut self, path: &str) -> Option<NodeId> {
        let found = self.match_path(path)?;
        self.captures = found.params;
        Some(found.catcher)
    }

    /// Captures of the most recent successful `match_route`.
    #[must_use]
    pub fn parameters(&self) -> &RouteParams {
        &self.captures
    }

    /// Match a path without touching the capture slot.
    ///
    /// Paths longer than `MAX_PATH_SEGMENTS` never match.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<RouteMatch> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        if segments.len() > MAX_PATH_SEGMENTS {
            return None;
        }

        let scoped = match segments.split_first() {
            Some((first, rest)) if !rest.is_empty() => {
                self.modules.get(*first).map(|indices| (indices, rest))
            }
            _ => None,
        };

        let (candidates, remaining): (Vec<&RouteDescriptor>, &[&str]) = match scoped {
            Some((indices, rest)) => (
                indices.iter().filter_map(|&i| self.routes.get(i)).collect(),
                rest,
            ),
            None => (self.routes.iter().collect(), &segments[..]),
        };

        candidates
            .into_iter()
            .find_map(|route| match_descriptor(route, remaining))
    }

    /// All routes in declaration order.
    pub fn routes(&self) -> impl Iterator<Item = &RouteDescriptor> {
        self.routes.iter()
    }

    /// Routes registered under a module, in declaration order.
    pub fn module_routes<'a>(&'a self, module: &str) -> impl Iterator<Item = &'a RouteDescriptor> {
        self.modules
            .get(module)
            .into_iter()
            .flat_map(move |indices| indices.iter().filter_map(move |&i| self.routes.get(i)))
    }

    /// Registered module names.
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True when no route is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Capture name if `segment` has the exact form `<:name>`.
fn capture_name(segment: &str) -> Option<&str> {
    segment
        .strip_prefix(CAPTURE_OPEN)?
        .strip_suffix(CAPTURE_CLOSE)
        .filter(|name| !name.is_empty())
}

fn match_descriptor(route: &RouteDescriptor, remaining: &[&str]) -> Option<RouteMatch> {
    let mut params = route.defaults.clone().unwrap_or_default();
    let pattern = route.pattern.trim_start_matches('/');

    if remaining.first().is_some_and(|first| *first == pattern) {
        return Some(RouteMatch {
            catcher: route.catcher,
            params,
        });
    }

    let pattern_segments: Vec<&str> = pattern.trim_end_matches('/').split('/').collect();
    if pattern_segments.len() != remaining.len() {
        return None;
    }

    for (expected, actual) in pattern_segments.iter().zip(remaining) {
        match capture_name(expected) {
            Some(name) => {
                params.insert(name.to_string(), (*actual).to_string());
            }
            None if expected == actual => {}
            None => return None,
        }
    }

    Some(RouteMatch {
        catcher: route.catcher,
        params,
    })
}

// =============================================================================
// TESTS
// =============================================================================
