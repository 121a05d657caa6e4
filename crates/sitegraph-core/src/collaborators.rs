//! # Dispatch Collaborators
//!
//! Interfaces the dispatcher calls out to, plus small in-process
//! implementations:
//!
//! - `FileLoader`: reads external include files (`MemoryFiles`)
//! - `TransactionManager`: one transaction per dispatch (`TracingTransactions`)
//! - `CronLedger`: last-run timestamps of cron nodes (`MemoryCronLedger`)
//!
//! The redb store implements `CronLedger` persistently.

use crate::{NodeId, SiteError};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// FILE LOADER
// =============================================================================

/// Source of external include files.
pub trait FileLoader: Send + Sync {
    /// Contents of `path`, or `None` when no such file exists.
    fn load(&self, path: &str) -> Result<Option<String>, SiteError>;
}

/// Include files held in memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryFiles {
    files: BTreeMap<String, String>,
}

impl MemoryFiles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn insert(&mut self, path: impl Into<String>, body: impl Into<String>) {
        self.files.insert(path.into(), body.into());
    }
}

impl FileLoader for MemoryFiles {
    fn load(&self, path: &str) -> Result<Option<String>, SiteError> {
        Ok(self.files.get(path).cloned())
    }
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Opaque handle of an open transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

/// Transaction boundary wrapped around every dispatch.
pub trait TransactionManager: Send + Sync {
    fn begin(&self) -> Result<TransactionId, SiteError>;
    fn commit(&self, tx: TransactionId) -> Result<(), SiteError>;
    fn rollback(&self, tx: TransactionId) -> Result<(), SiteError>;
}

/// Transaction manager that only logs and counts.
///
/// Stands in when no database-backed unit of work is attached.
#[derive(Debug, Default)]
pub struct TracingTransactions {
    next: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
}

impl TracingTransactions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transactions opened so far.
    #[must_use]
    pub fn begun(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn rolled_back(&self) -> u64 {
        self.rolled_back.load(Ordering::Relaxed)
    }
}

impl TransactionManager for TracingTransactions {
    fn begin(&self) -> Result<TransactionId, SiteError> {
        let id = self.next.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        tracing::trace!(tx = id, "transaction begin");
        Ok(TransactionId(id))
    }

    fn commit(&self, tx: TransactionId) -> Result<(), SiteError> {
        self.committed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(tx = tx.0, "transaction commit");
        Ok(())
    }

    fn rollback(&self, tx: TransactionId) -> Result<(), SiteError> {
        self.rolled_back.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(tx = tx.0, "transaction rollback");
        Ok(())
    }
}

// =============================================================================
// CRON LEDGER
// =============================================================================

/// Persistent "last run" record of cron nodes (Unix seconds).
pub trait CronLedger: Send + Sync {
    fn record_run(&self, node: NodeId, at: i64) -> Result<(), SiteError>;
    fn last_run(&self, node: NodeId) -> Result<Option<i64>, SiteError>;
}

/// In-memory cron ledger.
#[derive(Debug, Default)]
pub struct MemoryCronLedger {
    runs: Mutex<BTreeMap<NodeId, i64>>,
}

impl MemoryCronLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CronLedger for MemoryCronLedger {
    fn record_run(&self, node: NodeId, at: i64) -> Result<(), SiteError> {
        self.runs
            .lock()
            .map_err(|e| SiteError::IoError(e.to_string()))?
            .insert(node, at);
        Ok(())
    }

    fn last_run(&self, node: NodeId) -> Result<Option<i64>, SiteError> {
        Ok(self
            .runs
            .lock()
            .map_err(|e| SiteError::IoError(e.to_string()))?
            .get(&node)
            .copied())
    }
}
