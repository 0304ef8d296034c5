#![deny(clippy::unwrap_used)]

//! In-memory plus persistent cache of `CompilerInfo`, keyed by
//! `CompilerInfoKey` and invalidated by the compiler binary's `FileStat`
//! (§4.3). A failed discovery is cached too, but only for
//! `NEGATIVE_CACHE_TTL` before the next lookup retries it, matching
//! `kNegativeCacheDuration` in the original coordinator's
//! `compiler_info_cache.cc`.

use std::{sync::Arc, time::Instant};

use anyhow::{Result, anyhow};
use ccelerate_shared::WrappedBinary;
use parking_lot::Mutex;

use crate::{
    compiler_info::{self, CompilerInfo, CompilerInfoKey, NEGATIVE_CACHE_TTL},
    compute_cache::ComputeCache,
    file_stat::{FileStat, FileStatCache},
};

#[derive(Clone)]
enum Entry {
    Ok(CompilerInfo),
    Err(String, Instant),
}

pub struct CompilerInfoCache {
    memory: ComputeCache<CompilerInfoKey, Option<FileStat>, Entry>,
    conn: Arc<Mutex<rusqlite::Connection>>,
    file_stats: Arc<FileStatCache>,
}

impl CompilerInfoCache {
    pub fn new(conn: Arc<Mutex<rusqlite::Connection>>, file_stats: Arc<FileStatCache>) -> Self {
        Self {
            memory: ComputeCache::new(),
            conn,
            file_stats,
        }
    }

    pub async fn get(&self, binary: WrappedBinary, key: &CompilerInfoKey) -> Result<CompilerInfo> {
        let stat = self.file_stats.stat(&key.local_compiler_path);
        let entry = self
            .memory
            .get(key, &stat, || async {
                if let Some(entry) = self.load_persisted(key, &stat) {
                    return entry;
                }
                match compiler_info::discover(binary, key).await {
                    Ok(info) => {
                        self.persist(key, &stat, &info);
                        Entry::Ok(info)
                    }
                    Err(e) => Entry::Err(e.to_string(), Instant::now()),
                }
            })
            .await;

        match entry {
            Entry::Ok(info) => Ok(info),
            Entry::Err(message, at) if at.elapsed() < NEGATIVE_CACHE_TTL => Err(anyhow!(message)),
            Entry::Err(..) => {
                let info = compiler_info::discover(binary, key).await?;
                self.persist(key, &stat, &info);
                Ok(info)
            }
        }
    }

    fn load_persisted(&self, key: &CompilerInfoKey, stat: &Option<FileStat>) -> Option<Entry> {
        let key_json = serde_json::to_string(key).ok()?;
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT data, mtime_nanos, size, is_directory FROM CompilerInfos WHERE key_json = ?1",
                rusqlite::params![key_json],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )
            .ok()?;
        let (data, mtime_nanos, size, is_directory) = row;
        let stored_stat = match (mtime_nanos, size, is_directory) {
            (Some(m), Some(s), Some(d)) => Some(FileStat {
                mtime_nanos: m as i128,
                size: s as u64,
                is_directory: d != 0,
            }),
            _ => None,
        };
        if stored_stat != *stat {
            return None;
        }
        serde_json::from_str::<CompilerInfo>(&data).ok().map(Entry::Ok)
    }

    fn persist(&self, key: &CompilerInfoKey, stat: &Option<FileStat>, info: &CompilerInfo) {
        let (Ok(key_json), Ok(data)) = (serde_json::to_string(key), serde_json::to_string(info))
        else {
            return;
        };
        let (mtime_nanos, size, is_directory) = match stat {
            Some(s) => (
                Some(s.mtime_nanos as i64),
                Some(s.size as i64),
                Some(i64::from(s.is_directory)),
            ),
            None => (None, None, None),
        };
        let _ = self.conn.lock().execute(
            "INSERT OR REPLACE INTO CompilerInfos (key_json, data, mtime_nanos, size, is_directory) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![key_json, data, mtime_nanos, size, is_directory],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Arc<Mutex<rusqlite::Connection>> {
        let conn = rusqlite::Connection::open_in_memory().expect("open");
        conn.execute(
            "CREATE TABLE CompilerInfos (key_json TEXT PRIMARY KEY, data TEXT NOT NULL, mtime_nanos INTEGER, size INTEGER, is_directory INTEGER)",
            [],
        )
        .expect("create table");
        Arc::new(Mutex::new(conn))
    }

    #[tokio::test]
    async fn caches_discovery_and_reuses_it_without_rerunning() {
        let dir = tempfile::tempdir().expect("tempdir");
        let compiler = dir.path().join("cc");
        std::fs::write(&compiler, b"#!/bin/sh\necho fake\n").expect("write");

        let cache = CompilerInfoCache::new(test_conn(), FileStatCache::new());
        let key = CompilerInfoKey {
            local_compiler_path: compiler.clone(),
            compiler_info_flags: vec![],
            key_envs: vec![],
            lang: "c".to_string(),
            cwd: dir.path().to_path_buf(),
        };

        let first = cache.get(WrappedBinary::Gcc, &key).await.expect("first lookup");
        let second = cache.get(WrappedBinary::Gcc, &key).await.expect("second lookup");
        assert_eq!(first.compiler_hash, second.compiler_hash);
    }

    #[tokio::test]
    async fn a_changed_compiler_binary_invalidates_the_cached_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let compiler = dir.path().join("cc");
        std::fs::write(&compiler, b"one").expect("write");

        let file_stats = FileStatCache::new();
        let cache = CompilerInfoCache::new(test_conn(), file_stats.clone());
        let key = CompilerInfoKey {
            local_compiler_path: compiler.clone(),
            compiler_info_flags: vec![],
            key_envs: vec![],
            lang: "c".to_string(),
            cwd: dir.path().to_path_buf(),
        };
        let first = cache.get(WrappedBinary::Gcc, &key).await.expect("first");

        std::fs::write(&compiler, b"a very different binary content").expect("rewrite");
        file_stats.invalidate(&compiler);
        let second = cache.get(WrappedBinary::Gcc, &key).await.expect("second");
        assert_ne!(first.compiler_hash, second.compiler_hash);
    }
}
