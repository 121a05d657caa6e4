//! # Filesystem Includes
//!
//! `FsLoader` serves external-file nodes from a directory. Node links are
//! relative paths below that directory; anything that would escape it is
//! treated as missing.

use sitegraph_core::{FileLoader, SiteError};
use std::path::{Component, Path, PathBuf};

/// Maximum include file size (4 MB).
const MAX_INCLUDE_SIZE: u64 = 4 * 1024 * 1024;

/// Include files read from disk below `root`.
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `link` below the root, rejecting absolute and parent paths.
    fn locate(&self, link: &str) -> Option<PathBuf> {
        let relative = Path::new(link.trim_start_matches('/'));
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        safe.then(|| self.root.join(relative))
    }
}

impl FileLoader for FsLoader {
    fn load(&self, path: &str) -> Result<Option<String>, SiteError> {
        let Some(full) = self.locate(path) else {
            tracing::warn!(path, "include path escapes the include root");
            return Ok(None);
        };

        let metadata = match std::fs::metadata(&full) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SiteError::IoError(e.to_string())),
        };
        if metadata.len() > MAX_INCLUDE_SIZE {
            return Err(SiteError::IoError(format!(
                "Include {} is {} bytes, maximum is {}",
                full.display(),
                metadata.len(),
                MAX_INCLUDE_SIZE
            )));
        }

        std::fs::read_to_string(&full)
            .map(Some)
            .map_err(|e| SiteError::IoError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_files_below_root() {
        let dir = tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("legal")).expect("mkdir");
        std::fs::write(dir.path().join("legal/terms.html"), "<p>terms</p>").expect("write");

        let loader = FsLoader::new(dir.path());
        assert_eq!(
            loader.load("legal/terms.html").expect("load").as_deref(),
            Some("<p>terms</p>")
        );
        assert_eq!(
            loader.load("/legal/terms.html").expect("load").as_deref(),
            Some("<p>terms</p>")
        );
    }

    #[test]
    fn missing_and_escaping_paths_are_none() {
        let dir = tempdir().expect("tempdir");
        let loader = FsLoader::new(dir.path().join("includes"));

        assert_eq!(loader.load("nope.html").expect("load"), None);
        assert_eq!(loader.load("../secret").expect("load"), None);
        assert_eq!(loader.load("a/../../b").expect("load"), None);
    }

    #[test]
    fn directories_are_not_files() {
        let dir = tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("sub")).expect("mkdir");
        let loader = FsLoader::new(dir.path());
        assert_eq!(loader.load("sub").expect("load"), None);
    }
}
