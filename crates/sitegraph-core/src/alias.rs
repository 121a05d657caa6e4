//! # Alias Index
//!
//! Slug -> node id map built alongside a role's graph.

use crate::NodeId;
use crate::primitives::MAX_ALIAS_LENGTH;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique slugs of one role's graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasIndex {
    slugs: BTreeMap<String, NodeId>,
}

impl AliasIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `slug` for `target`.
    ///
    /// Returns `false` when the slug is empty, too long, or already taken.
    /// The first registration of a slug wins.
    pub fn insert(&mut self, slug: &str, target: NodeId) -> bool {
        let slug = slug.trim_matches('/');
        if slug.is_empty() || slug.len() > MAX_ALIAS_LENGTH || self.slugs.contains_key(slug) {
            return false;
        }
        self.slugs.insert(slug.to_string(), target);
        true
    }

    /// Node registered for `slug`.
    #[must_use]
    pub fn get(&self, slug: &str) -> Option<NodeId> {
        self.slugs.get(slug.trim_matches('/')).copied()
    }

    #[must_use]
    pub fn contains(&self, slug: &str) -> bool {
        self.get(slug).is_some()
    }

    /// All slugs in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.slugs.iter().map(|(k, v)| (k.as_str(), *v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slugs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }
}
