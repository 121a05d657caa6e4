//! # redb-backed Graph Cache
//!
//! Persists graph snapshots between process runs. Can share the site
//! store's database file or use its own.

use super::redb_store::RedbSiteStore;
use crate::cache::GraphCache;
use crate::SiteError;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

/// Table for snapshots: cache key -> snapshot bytes
const SNAPSHOTS: TableDefinition<&str, &[u8]> = TableDefinition::new("graph_snapshots");

fn io(e: impl std::fmt::Display) -> SiteError {
    SiteError::IoError(e.to_string())
}

/// Graph cache stored in a redb table.
#[derive(Clone)]
pub struct RedbCache {
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbCache").finish_non_exhaustive()
    }
}

impl RedbCache {
    /// Open or create a dedicated cache database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SiteError> {
        let db = Database::create(path.as_ref()).map_err(io)?;
        Self::with_database(Arc::new(db))
    }

    /// Cache living in the site store's database file.
    pub fn shared_with(store: &RedbSiteStore) -> Result<Self, SiteError> {
        Self::with_database(store.database())
    }

    fn with_database(db: Arc<Database>) -> Result<Self, SiteError> {
        let write_txn = db.begin_write().map_err(io)?;
        {
            let _ = write_txn.open_table(SNAPSHOTS).map_err(io)?;
        }
        write_txn.commit().map_err(io)?;
        Ok(Self { db })
    }

    /// Cached keys in order.
    pub fn keys(&self) -> Result<Vec<String>, SiteError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(SNAPSHOTS).map_err(io)?;

        let mut keys = Vec::new();
        for entry in table.iter().map_err(io)? {
            let (key, _) = entry.map_err(io)?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }
}

impl GraphCache for RedbCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SiteError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(SNAPSHOTS).map_err(io)?;
        Ok(table.get(key).map_err(io)?.map(|v| v.value().to_vec()))
    }

    fn set(&self, key: &str, blob: &[u8]) -> Result<(), SiteError> {
        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = write_txn.open_table(SNAPSHOTS).map_err(io)?;
            table.insert(key, blob).map_err(io)?;
        }
        write_txn.commit().map_err(io)?;
        Ok(())
    }

    fn flush(&self, key: Option<&str>) -> Result<(), SiteError> {
        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = write_txn.open_table(SNAPSHOTS).map_err(io)?;
            match key {
                Some(key) => {
                    table.remove(key).map_err(io)?;
                }
                None => {
                    table.retain(|_, _| false).map_err(io)?;
                }
            }
        }
        write_txn.commit().map_err(io)?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn set_get_flush() {
        let temp = tempdir().expect("temp dir");
        let cache = RedbCache::open(temp.path().join("cache.redb")).expect("open db");

        cache.set("sitegraph:guest", b"one").expect("set");
        cache.set("sitegraph:admin", b"two").expect("set");
        assert_eq!(
            cache.get("sitegraph:guest").expect("get").as_deref(),
            Some(&b"one"[..])
        );

        cache.flush(Some("sitegraph:guest")).expect("flush one");
        assert!(cache.get("sitegraph:guest").expect("get").is_none());
        assert_eq!(cache.keys().expect("keys"), vec!["sitegraph:admin"]);

        cache.flush(None).expect("flush all");
        assert!(cache.keys().expect("keys").is_empty());
    }

    #[test]
    fn shares_store_file() {
        let temp = tempdir().expect("temp dir");
        let store = RedbSiteStore::open(temp.path().join("site.redb")).expect("open db");
        let cache = RedbCache::shared_with(&store).expect("cache");

        cache.set("sitegraph:unfiltered", b"blob").expect("set");
        let again = RedbCache::shared_with(&store).expect("cache");
        assert!(again.get("sitegraph:unfiltered").expect("get").is_some());
    }
}
