#![deny(clippy::unwrap_used)]

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use parking_lot::Mutex;

/// (mtime, size, is-directory, valid?) — used only for invalidation, never
/// for content (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct FileStat {
    pub mtime_nanos: i128,
    pub size: u64,
    pub is_directory: bool,
}

impl FileStat {
    pub fn invalid() -> Option<Self> {
        None
    }

    fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let mtime_nanos = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i128)
            .unwrap_or(0);
        Self {
            mtime_nanos,
            size: meta.len(),
            is_directory: meta.is_dir(),
        }
    }
}

/// Sharded per-path cache of `FileStat`s, matching spec.md §5's "internally
/// sharded; per-path lock" requirement for the file-hash/stat cache.
pub struct FileStatCache {
    shards: Vec<Mutex<std::collections::HashMap<PathBuf, Option<FileStat>>>>,
}

const NUM_SHARDS: usize = 16;

impl FileStatCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            shards: (0..NUM_SHARDS).map(|_| Mutex::new(Default::default())).collect(),
        })
    }

    fn shard_for(&self, path: &Path) -> &Mutex<std::collections::HashMap<PathBuf, Option<FileStat>>> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        std::hash::Hash::hash(&path, &mut hasher);
        let index = (std::hash::Hasher::finish(&hasher) as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Stat `path`, using the cached value if present. Returns `None` if the
    /// path does not exist or cannot be statted.
    pub fn stat(&self, path: &Path) -> Option<FileStat> {
        let shard = self.shard_for(path);
        if let Some(cached) = shard.lock().get(path) {
            return *cached;
        }
        let stat = std::fs::metadata(path).ok().map(|meta| FileStat::from_metadata(&meta));
        shard.lock().insert(path.to_path_buf(), stat);
        stat
    }

    /// Drop any cached entry for `path`, forcing the next `stat` to hit disk.
    pub fn invalidate(&self, path: &Path) {
        self.shard_for(path).lock().remove(path);
    }
}

impl Default for FileStatCache {
    fn default() -> Self {
        // Arc::new requires going through `new`; `Default` exists for ergonomics
        // where an owned (non-Arc) instance is acceptable, e.g. in unit tests.
        Self {
            shards: (0..NUM_SHARDS).map(|_| Mutex::new(Default::default())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_a_real_file_and_caches_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"hello").expect("write");

        let cache = FileStatCache::default();
        let stat = cache.stat(&file).expect("should stat");
        assert_eq!(stat.size, 5);
        assert!(!stat.is_directory);

        // Modify the file on disk without invalidating; cached stat should stick.
        std::fs::write(&file, b"hello world").expect("write");
        let cached_again = cache.stat(&file).expect("should still be cached");
        assert_eq!(cached_again, stat);

        cache.invalidate(&file);
        let fresh = cache.stat(&file).expect("should stat again");
        assert_eq!(fresh.size, 11);
    }

    #[test]
    fn missing_file_stats_to_none() {
        let cache = FileStatCache::default();
        assert!(cache.stat(Path::new("/does/not/exist/at/all")).is_none());
    }
}
