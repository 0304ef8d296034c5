#![deny(clippy::unwrap_used)]

//! Dependency cache (§4.4): maps a `DepsIdentifier` derived from a compile
//! command to the set of files that compile's include graph depended on,
//! so a later compile with the same identifier can skip re-deriving the
//! include graph when none of those files changed. Grounded on
//! `deps_cache.cc`'s identifier-to-dependency-list persistence in the
//! original coordinator; filenames are interned the way `interner.rs`
//! documents, since the same headers recur across a large share of
//! entries.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use parking_lot::Mutex;

use crate::{content_hash::ContentHash, file_stat::FileStat, interner::Interner};

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DepsIdentifier(pub String);

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DepEntry {
    pub path: PathBuf,
    pub stat: Option<FileStat>,
    pub directive_hash: ContentHash,
}

/// What a compile identifier's previous resolution produced: the hash of its
/// own (non-header) preprocessed code plus the header set it depended on.
/// `source_hash` guards against the translation unit itself having changed;
/// `is_up_to_date` guards the header set.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DepsCacheEntry {
    pub source_hash: ContentHash,
    pub local_code_hash: ContentHash,
    pub deps: Vec<DepEntry>,
}

pub struct DepsCache {
    conn: Arc<Mutex<rusqlite::Connection>>,
    filenames: Mutex<Interner<PathBuf>>,
}

impl DepsCache {
    pub fn new(conn: Arc<Mutex<rusqlite::Connection>>) -> Self {
        Self {
            conn,
            filenames: Mutex::new(Interner::new()),
        }
    }

    /// Stores `entry` under `id`, replacing whatever was stored before
    /// (dedup-on-save: an identifier never accumulates more than one
    /// entry).
    pub fn put(&self, id: &DepsIdentifier, entry: &DepsCacheEntry) -> Result<()> {
        {
            let mut filenames = self.filenames.lock();
            for dep in &entry.deps {
                filenames.intern(dep.path.clone());
            }
        }
        let data = serde_json::to_string(entry)?;
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO DepsEntries (id, data) VALUES (?1, ?2)",
            rusqlite::params![id.0, data],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &DepsIdentifier) -> Option<DepsCacheEntry> {
        self.conn
            .lock()
            .query_row(
                "SELECT data FROM DepsEntries WHERE id = ?1",
                rusqlite::params![id.0],
                |row| row.get::<usize, String>(0),
            )
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok())
    }

    /// A cached dependency set is usable only if every dependency's current
    /// stat still matches what was recorded; when the stat drifted (e.g. a
    /// rebuild touched mtime without changing content) it falls back to a
    /// directive-hash comparison before declaring the entry stale (§4.4).
    pub fn is_up_to_date(
        &self,
        deps: &[DepEntry],
        current_stat: impl Fn(&Path) -> Option<FileStat>,
        current_directive_hash: impl Fn(&Path) -> Option<ContentHash>,
    ) -> bool {
        deps.iter().all(|dep| {
            if current_stat(&dep.path) == dep.stat {
                return true;
            }
            current_directive_hash(&dep.path).as_ref() == Some(&dep.directive_hash)
        })
    }

    pub fn interned_filename_count(&self) -> usize {
        self.filenames.lock().len()
    }
}
