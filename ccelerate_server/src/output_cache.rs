#![deny(clippy::unwrap_used)]

//! Local-output cache (§4.6): memoizes the result of a previous compile or
//! link keyed by its command plus the content hashes of its inputs, so a
//! repeated invocation over unchanged inputs can be served without
//! rerunning the subprocess or the remote path.

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use parking_lot::Mutex;

use crate::content_hash::ContentHash;

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct OutputCacheKey {
    pub command_hash: ContentHash,
    pub input_hashes: Vec<ContentHash>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CachedOutput {
    pub output_path: PathBuf,
    pub output_hash: ContentHash,
    /// The output file's bytes, so a hit can rewrite `output_path` without
    /// rerunning the compiler.
    pub output_bytes: Vec<u8>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

pub struct OutputCache {
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl OutputCache {
    pub fn new(conn: Arc<Mutex<rusqlite::Connection>>) -> Self {
        Self { conn }
    }

    pub fn get(&self, key: &OutputCacheKey) -> Option<CachedOutput> {
        let key_json = serde_json::to_string(key).ok()?;
        self.conn
            .lock()
            .query_row(
                "SELECT data FROM OutputCacheEntries WHERE key_json = ?1",
                rusqlite::params![key_json],
                |row| row.get::<usize, String>(0),
            )
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok())
    }

    pub fn put(&self, key: &OutputCacheKey, output: &CachedOutput) -> Result<()> {
        let key_json = serde_json::to_string(key)?;
        let data = serde_json::to_string(output)?;
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO OutputCacheEntries (key_json, data) VALUES (?1, ?2)",
            rusqlite::params![key_json, data],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Arc<Mutex<rusqlite::Connection>> {
        let conn = rusqlite::Connection::open_in_memory().expect("open");
        conn.execute(
            "CREATE TABLE OutputCacheEntries (key_json TEXT PRIMARY KEY, data TEXT NOT NULL)",
            [],
        )
        .expect("create table");
        Arc::new(Mutex::new(conn))
    }

    #[test]
    fn miss_then_put_then_hit() {
        let cache = OutputCache::new(test_conn());
        let key = OutputCacheKey {
            command_hash: ContentHash::of_bytes(b"gcc -c a.c"),
            input_hashes: vec![ContentHash::of_bytes(b"a.c contents")],
        };
        assert!(cache.get(&key).is_none());

        let output = CachedOutput {
            output_path: PathBuf::from("a.o"),
            output_hash: ContentHash::of_bytes(b"a.o contents"),
            output_bytes: b"a.o contents".to_vec(),
            stdout: Vec::new(),
            stderr: Vec::new(),
        };
        cache.put(&key, &output).expect("put");
        let hit = cache.get(&key).expect("should hit");
        assert_eq!(hit, output);
        assert_eq!(hit.output_bytes, b"a.o contents");
    }

    #[test]
    fn different_input_hashes_are_different_keys() {
        let cache = OutputCache::new(test_conn());
        let base_command = ContentHash::of_bytes(b"gcc -c a.c");
        let key_a = OutputCacheKey {
            command_hash: base_command.clone(),
            input_hashes: vec![ContentHash::of_bytes(b"version 1")],
        };
        let key_b = OutputCacheKey {
            command_hash: base_command,
            input_hashes: vec![ContentHash::of_bytes(b"version 2")],
        };
        cache
            .put(
                &key_a,
                &CachedOutput {
                    output_path: PathBuf::from("a.o"),
                    output_hash: ContentHash::of_bytes(b"out 1"),
                    output_bytes: b"out 1".to_vec(),
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                },
            )
            .expect("put a");
        assert!(cache.get(&key_b).is_none());
    }
}
