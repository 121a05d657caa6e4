//! # redb-backed Site Store
//!
//! Persistent node table, `(role, node)` permission table and cron
//! last-run ledger in one redb database.
//!
//! Rows are stored postcard-encoded under their node id. Permission keys
//! are `(role, node_id)` tuples so one role's grants are a single range
//! scan.

use crate::collaborators::CronLedger;
use crate::source::NodeSource;
use crate::{NodeId, NodeRow, RoleId, SiteError};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// Table for node rows: node_id -> postcard NodeRow
const NODES: TableDefinition<u64, &[u8]> = TableDefinition::new("nodes");

/// Table for permissions: (role, node_id) -> ()
const PERMISSIONS: TableDefinition<(&str, u64), ()> = TableDefinition::new("permissions");

/// Table for cron runs: node_id -> unix seconds
const CRON_RUNS: TableDefinition<u64, i64> = TableDefinition::new("cron_runs");

fn io(e: impl std::fmt::Display) -> SiteError {
    SiteError::IoError(e.to_string())
}

/// Node, permission and cron storage on redb.
#[derive(Clone)]
pub struct RedbSiteStore {
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbSiteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbSiteStore").finish_non_exhaustive()
    }
}

impl RedbSiteStore {
    /// Open or create a site database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SiteError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let write_txn = db.begin_write().map_err(io)?;
        {
            let _ = write_txn.open_table(NODES).map_err(io)?;
            let _ = write_txn.open_table(PERMISSIONS).map_err(io)?;
            let _ = write_txn.open_table(CRON_RUNS).map_err(io)?;
        }
        write_txn.commit().map_err(io)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Shared database handle, for collaborators living in the same file.
    pub(crate) fn database(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    /// Insert or replace rows and grant permissions in one transaction.
    pub fn import(&self, rows: &[NodeRow], grants: &[(RoleId, u64)]) -> Result<(), SiteError> {
        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let mut nodes = write_txn.open_table(NODES).map_err(io)?;
            for row in rows {
                let bytes = postcard::to_allocvec(row)
                    .map_err(|e| SiteError::SerializationError(e.to_string()))?;
                nodes.insert(row.node_id, bytes.as_slice()).map_err(io)?;
            }
            let mut permissions = write_txn.open_table(PERMISSIONS).map_err(io)?;
            for (role, node_id) in grants {
                permissions.insert((role.as_str(), *node_id), ()).map_err(io)?;
            }
        }
        write_txn.commit().map_err(io)?;
        tracing::info!(rows = rows.len(), grants = grants.len(), "imported site rows");
        Ok(())
    }

    /// Insert or replace one row.
    pub fn upsert_row(&self, row: &NodeRow) -> Result<(), SiteError> {
        self.import(std::slice::from_ref(row), &[])
    }

    /// Delete a row and every permission that names it.
    pub fn remove_row(&self, node_id: u64) -> Result<bool, SiteError> {
        let write_txn = self.db.begin_write().map_err(io)?;
        let removed = {
            let mut nodes = write_txn.open_table(NODES).map_err(io)?;
            let removed = nodes.remove(node_id).map_err(io)?.is_some();

            let mut permissions = write_txn.open_table(PERMISSIONS).map_err(io)?;
            let mut stale = Vec::new();
            for entry in permissions.iter().map_err(io)? {
                let (key, _) = entry.map_err(io)?;
                let (role, id) = key.value();
                if id == node_id {
                    stale.push(role.to_string());
                }
            }
            for role in &stale {
                permissions.remove((role.as_str(), node_id)).map_err(io)?;
            }
            removed
        };
        write_txn.commit().map_err(io)?;
        Ok(removed)
    }

    /// Allow `role` to see `node_id`.
    pub fn grant(&self, role: &RoleId, node_id: u64) -> Result<(), SiteError> {
        self.import(&[], &[(role.clone(), node_id)])
    }

    /// Withdraw a permission. Returns whether it existed.
    pub fn revoke(&self, role: &RoleId, node_id: u64) -> Result<bool, SiteError> {
        let write_txn = self.db.begin_write().map_err(io)?;
        let existed = {
            let mut permissions = write_txn.open_table(PERMISSIONS).map_err(io)?;
            permissions
                .remove((role.as_str(), node_id))
                .map_err(io)?
                .is_some()
        };
        write_txn.commit().map_err(io)?;
        Ok(existed)
    }

    /// Every role holding at least one permission, in order.
    pub fn roles(&self) -> Result<BTreeSet<RoleId>, SiteError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let permissions = read_txn.open_table(PERMISSIONS).map_err(io)?;

        let mut roles = BTreeSet::new();
        for entry in permissions.iter().map_err(io)? {
            let (key, _) = entry.map_err(io)?;
            roles.insert(RoleId::new(key.value().0));
        }
        Ok(roles)
    }

    /// Whether `role` holds at least one grant.
    pub fn has_role(&self, role: &RoleId) -> Result<bool, SiteError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let permissions = read_txn.open_table(PERMISSIONS).map_err(io)?;
        let mut grants = permissions
            .range((role.as_str(), 0u64)..=(role.as_str(), u64::MAX))
            .map_err(io)?;
        Ok(grants.next().transpose().map_err(io)?.is_some())
    }

    /// Number of stored rows.
    pub fn row_count(&self) -> Result<usize, SiteError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let nodes = read_txn.open_table(NODES).map_err(io)?;
        Ok(nodes.len().map_err(io)? as usize)
    }

    /// Number of permission entries.
    pub fn grant_count(&self) -> Result<usize, SiteError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let permissions = read_txn.open_table(PERMISSIONS).map_err(io)?;
        Ok(permissions.len().map_err(io)? as usize)
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<bool, SiteError> {
        match Arc::get_mut(&mut self.db) {
            Some(db) => db.compact().map_err(io),
            None => Ok(false),
        }
    }
}

fn decode_row(bytes: &[u8]) -> Result<NodeRow, SiteError> {
    postcard::from_bytes(bytes).map_err(|e| SiteError::SerializationError(e.to_string()))
}

// =============================================================================
// COLLABORATOR IMPLEMENTATIONS
// =============================================================================

impl NodeSource for RedbSiteStore {
    fn visible_rows(&self, role: &RoleId) -> Result<Vec<NodeRow>, SiteError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let permissions = read_txn.open_table(PERMISSIONS).map_err(io)?;
        let nodes = read_txn.open_table(NODES).map_err(io)?;

        let mut rows = Vec::new();
        for entry in permissions
            .range((role.as_str(), 0u64)..=(role.as_str(), u64::MAX))
            .map_err(io)?
        {
            let (key, _) = entry.map_err(io)?;
            let (_, node_id) = key.value();
            // Permissions may outlive their row.
            if let Some(data) = nodes.get(node_id).map_err(io)? {
                rows.push(decode_row(data.value())?);
            }
        }
        Ok(rows)
    }

    fn all_rows(&self) -> Result<Vec<NodeRow>, SiteError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let nodes = read_txn.open_table(NODES).map_err(io)?;

        let mut rows = Vec::new();
        for entry in nodes.iter().map_err(io)? {
            let (_, value) = entry.map_err(io)?;
            rows.push(decode_row(value.value())?);
        }
        Ok(rows)
    }
}

impl CronLedger for RedbSiteStore {
    fn record_run(&self, node: NodeId, at: i64) -> Result<(), SiteError> {
        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let mut runs = write_txn.open_table(CRON_RUNS).map_err(io)?;
            runs.insert(node.0, at).map_err(io)?;
        }
        write_txn.commit().map_err(io)?;
        Ok(())
    }

    fn last_run(&self, node: NodeId) -> Result<Option<i64>, SiteError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let runs = read_txn.open_table(CRON_RUNS).map_err(io)?;
        Ok(runs.get(node.0).map_err(io)?.map(|v| v.value()))
    }
}

// =============================================================================
// TESTS
// =============================================================================
