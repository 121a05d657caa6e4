//! # Storage
//!
//! redb-backed collaborators: the site store (rows, permissions, cron
//! ledger) and the graph snapshot cache.

pub mod redb_cache;
pub mod redb_store;

pub use redb_cache::RedbCache;
pub use redb_store::RedbSiteStore;
