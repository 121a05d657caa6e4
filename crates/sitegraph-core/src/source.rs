//! # Node Source
//!
//! Read access to the persisted node table and its `(role, node)`
//! permission table.

use crate::{NodeRow, RoleId, SiteError};
use std::collections::{BTreeMap, BTreeSet};

/// Provider of node rows.
///
/// Row order is not significant; the builder sorts rows structurally.
pub trait NodeSource: Send + Sync {
    /// Rows the role holds a permission entry for.
    fn visible_rows(&self, role: &RoleId) -> Result<Vec<NodeRow>, SiteError>;

    /// Every row, ignoring permissions.
    fn all_rows(&self) -> Result<Vec<NodeRow>, SiteError>;
}

/// In-memory node table with permissions.
#[derive(Debug, Clone, Default)]
pub struct MemoryNodeSource {
    rows: BTreeMap<u64, NodeRow>,
    grants: BTreeSet<(RoleId, u64)>,
}

impl MemoryNodeSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a row.
    pub fn insert(&mut self, row: NodeRow) {
        self.rows.insert(row.node_id, row);
    }

    /// Allow `role` to see `node_id`.
    pub fn grant(&mut self, role: &RoleId, node_id: u64) {
        self.grants.insert((role.clone(), node_id));
    }

    /// Allow `role` to see every row currently present.
    pub fn grant_all(&mut self, role: &RoleId) {
        let ids: Vec<u64> = self.rows.keys().copied().collect();
        for id in ids {
            self.grant(role, id);
        }
    }

    /// Withdraw a permission.
    pub fn revoke(&mut self, role: &RoleId, node_id: u64) {
        self.grants.remove(&(role.clone(), node_id));
    }
}

impl NodeSource for MemoryNodeSource {
    fn visible_rows(&self, role: &RoleId) -> Result<Vec<NodeRow>, SiteError> {
        Ok(self
            .rows
            .values()
            .filter(|row| self.grants.contains(&(role.clone(), row.node_id)))
            .cloned()
            .collect())
    }

    fn all_rows(&self) -> Result<Vec<NodeRow>, SiteError> {
        Ok(self.rows.values().cloned().collect())
    }
}
