//! Linked store resolution and caching.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::debug;

use crate::core::SceneConfig;
use crate::scene::{FileSceneStore, LocationHandle};
use crate::util::{Error, Result};

/// Opens the store a link descriptor names.
pub trait StoreResolver: Send + Sync {
    /// Root location of the store called `file_name`.
    fn resolve(&self, file_name: &str) -> Result<LocationHandle>;
}

/// Opens linked files as read-only [`FileSceneStore`]s.
pub struct FileResolver {
    config: SceneConfig,
    base_dir: Option<PathBuf>,
}

impl FileResolver {
    /// Relative file names are resolved against `base_dir` when given.
    pub fn new(config: SceneConfig, base_dir: Option<PathBuf>) -> Self {
        Self { config, base_dir }
    }

    fn full_path(&self, file_name: &str) -> PathBuf {
        let p = PathBuf::from(file_name);
        match &self.base_dir {
            Some(base) if p.is_relative() => base.join(p),
            _ => p,
        }
    }
}

impl StoreResolver for FileResolver {
    fn resolve(&self, file_name: &str) -> Result<LocationHandle> {
        let path = self.full_path(file_name);
        if !path.is_file() {
            return Err(Error::LinkTargetNotFound(path));
        }
        match FileSceneStore::open_with_config(&path, self.config.clone()) {
            Ok(store) => Ok(store as LocationHandle),
            Err(Error::FileNotFound(p)) => Err(Error::LinkTargetNotFound(p)),
            Err(e) => Err(e),
        }
    }
}

/// Linked store roots opened by one overlay, keyed by file name.
///
/// Lookups hold the lock across the open, so concurrent first use of an
/// entry opens the file once.
#[derive(Default)]
pub struct LinkCache {
    entries: Mutex<HashMap<String, LocationHandle>>,
}

impl LinkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached root for `file_name`, opening it through `resolver` on first use.
    pub fn get_or_open(&self, file_name: &str, resolver: &dyn StoreResolver) -> Result<LocationHandle> {
        let mut entries = self.entries.lock();
        if let Some(root) = entries.get(file_name) {
            return Ok(root.clone());
        }
        let root = resolver.resolve(file_name)?;
        debug!(file = file_name, "opened linked store");
        entries.insert(file_name.to_string(), root.clone());
        Ok(root)
    }

    /// Number of open linked stores.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// File names of the open linked stores, sorted.
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::MemoryScene;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        opens: AtomicUsize,
    }

    impl StoreResolver for Counting {
        fn resolve(&self, file_name: &str) -> Result<LocationHandle> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if file_name == "missing" {
                return Err(Error::LinkTargetNotFound(PathBuf::from(file_name)));
            }
            Ok(MemoryScene::new(file_name) as LocationHandle)
        }
    }

    #[test]
    fn test_cache_opens_once() {
        let resolver = Counting { opens: AtomicUsize::new(0) };
        let cache = LinkCache::new();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| cache.get_or_open("b.scc", &resolver).map(|_| ()));
            }
        });
        assert_eq!(resolver.opens.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);

        let a = cache.get_or_open("b.scc", &resolver).unwrap();
        let b = cache.get_or_open("b.scc", &resolver).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        assert!(cache.get_or_open("missing", &resolver).is_err());
        assert_eq!(cache.file_names(), vec!["b.scc"]);
    }

    #[test]
    fn test_file_resolver_missing_target() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = FileResolver::new(SceneConfig::default(), Some(dir.path().to_path_buf()));
        let err = resolver.resolve("nope.scc").err().unwrap();
        assert!(matches!(err, Error::LinkTargetNotFound(ref p) if p.ends_with("nope.scc")));
    }
}
