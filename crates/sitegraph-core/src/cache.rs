//! # Graph Cache
//!
//! The cache collaborator holding serialized graph snapshots.
//!
//! Implementations own the atomicity of their own reads and writes; the
//! builder treats any unreadable payload as a miss.

use crate::SiteError;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Key/value store for serialized snapshots.
pub trait GraphCache: Send + Sync {
    /// Stored blob for `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SiteError>;

    /// Store `blob` under `key`, replacing any previous value.
    fn set(&self, key: &str, blob: &[u8]) -> Result<(), SiteError>;

    /// Remove `key`, or everything when `key` is `None`.
    fn flush(&self, key: Option<&str>) -> Result<(), SiteError>;
}

/// Process-local cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>, SiteError> {
        self.entries
            .lock()
            .map_err(|e| SiteError::IoError(format!("cache lock poisoned: {}", e)))
    }
}

impl GraphCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SiteError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, blob: &[u8]) -> Result<(), SiteError> {
        self.lock()?.insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    fn flush(&self, key: Option<&str>) -> Result<(), SiteError> {
        let mut entries = self.lock()?;
        match key {
            Some(key) => {
                entries.remove(key);
            }
            None => entries.clear(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_flush() {
        let cache = MemoryCache::new();
        cache.set("a", b"one").expect("set");
        cache.set("b", b"two").expect("set");

        assert_eq!(cache.get("a").expect("get"), Some(b"one".to_vec()));

        cache.flush(Some("a")).expect("flush");
        assert_eq!(cache.get("a").expect("get"), None);
        assert_eq!(cache.len(), 1);

        cache.flush(None).expect("flush all");
        assert!(cache.is_empty());
    }
}
