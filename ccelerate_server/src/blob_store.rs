#![deny(clippy::unwrap_used)]

//! Content-addressed blob-service client (§4.5). Handles chunked
//! upload/download of large files with streaming, double-buffered
//! concurrency. The wire transport to the actual remote store is external to
//! this design (spec.md's "RPC transport" non-goal); `BlobBackend` is the
//! seam the real transport plugs into, and `LocalDirBlobBackend` is a
//! content-addressed directory used both by tests and as the default local
//! backing store.

use std::{
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Result, anyhow};
use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::content_hash::ContentHash;

/// 2 MiB, matching `kLargeFileThreshold`/`kFileChunkSize` in the original
/// file service (`lib/goma_file.cc`).
pub const LARGE_FILE_THRESHOLD: u64 = 2 * 1024 * 1024;
pub const CHUNK_SIZE: u64 = 2 * 1024 * 1024;
/// `kNumChunksInStreamRequest`.
const CHUNKS_PER_BATCH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileBlobKind {
    File,
    FileMeta,
    FileChunk,
    FileRef,
}

#[derive(Debug, Clone)]
pub struct FileBlob {
    pub kind: FileBlobKind,
    pub offset: u64,
    pub file_size: u64,
    pub content: Option<Vec<u8>>,
    pub chunk_hashes: Vec<ContentHash>,
    pub ref_hash: Option<ContentHash>,
}

impl FileBlob {
    /// Type is one of the four enumerated kinds, offsets are within size, and
    /// the chunk list matches the declared file-size — checked before a
    /// download touches its sink (§4.5 "Validity check").
    pub fn validate(&self) -> Result<()> {
        if self.offset > self.file_size {
            return Err(anyhow!(
                "blob offset {} exceeds file size {}",
                self.offset,
                self.file_size
            ));
        }
        match self.kind {
            FileBlobKind::File => {
                let content = self
                    .content
                    .as_ref()
                    .ok_or_else(|| anyhow!("FILE blob is missing content"))?;
                if content.len() as u64 != self.file_size {
                    return Err(anyhow!(
                        "FILE content size {} does not match declared file size {}",
                        content.len(),
                        self.file_size
                    ));
                }
            }
            FileBlobKind::FileMeta => {
                let expected_chunks = expected_chunk_count(self.file_size);
                if self.chunk_hashes.len() != expected_chunks {
                    return Err(anyhow!(
                        "FILE_META declares {} bytes but has {} chunk hashes (expected {})",
                        self.file_size,
                        self.chunk_hashes.len(),
                        expected_chunks
                    ));
                }
            }
            FileBlobKind::FileChunk => {
                return Err(anyhow!("FILE_CHUNK is not a valid top-level blob"));
            }
            FileBlobKind::FileRef => {
                if self.ref_hash.is_none() {
                    return Err(anyhow!("FILE_REF blob is missing its target hash"));
                }
            }
        }
        Ok(())
    }
}

fn expected_chunk_count(file_size: u64) -> usize {
    if file_size == 0 {
        return 0;
    }
    file_size.div_ceil(CHUNK_SIZE) as usize
}

fn chunk_offsets(file_size: u64) -> Vec<u64> {
    let mut offsets = Vec::new();
    let mut offset = 0;
    while offset < file_size {
        offsets.push(offset);
        offset += CHUNK_SIZE;
    }
    offsets
}

pub trait BlobBackend: Send + Sync + 'static {
    fn put_blob(&self, hash: ContentHash, bytes: Vec<u8>) -> BoxFuture<'static, Result<()>>;
    fn get_blob(&self, hash: ContentHash) -> BoxFuture<'static, Result<Option<Vec<u8>>>>;
}

/// A content-addressed directory: files are named by their hash. Used as the
/// default local backend and by tests.
pub struct LocalDirBlobBackend {
    dir: PathBuf,
}

impl LocalDirBlobBackend {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, hash: &ContentHash) -> PathBuf {
        self.dir.join(hash.as_str())
    }
}

impl BlobBackend for LocalDirBlobBackend {
    fn put_blob(&self, hash: ContentHash, bytes: Vec<u8>) -> BoxFuture<'static, Result<()>> {
        let path = self.path_for(&hash);
        Box::pin(async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, bytes).await?;
            Ok(())
        })
    }

    fn get_blob(&self, hash: ContentHash) -> BoxFuture<'static, Result<Option<Vec<u8>>>> {
        let path = self.path_for(&hash);
        Box::pin(async move {
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }
}

/// Where a downloaded blob's bytes should land: a file path (streaming
/// writes) or an in-memory buffer (pre-allocated to final size when known).
pub enum BlobSink {
    File(PathBuf),
    Memory(Arc<Mutex<Vec<u8>>>),
}

impl BlobSink {
    fn prepare(&self, file_size: u64) -> Result<()> {
        match self {
            BlobSink::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let file = std::fs::File::create(path)?;
                file.set_len(file_size)?;
                Ok(())
            }
            BlobSink::Memory(buf) => {
                let mut buf = buf.lock();
                buf.clear();
                buf.resize(file_size as usize, 0);
                Ok(())
            }
        }
    }

    fn write_at(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        match self {
            BlobSink::File(path) => {
                let file = std::fs::OpenOptions::new().write(true).open(path)?;
                file.write_at(bytes, offset)?;
                Ok(())
            }
            BlobSink::Memory(buf) => {
                let mut buf = buf.lock();
                let end = offset as usize + bytes.len();
                if buf.len() < end {
                    buf.resize(end, 0);
                }
                buf[offset as usize..end].copy_from_slice(bytes);
                Ok(())
            }
        }
    }
}

pub struct BlobStore<B: BlobBackend> {
    backend: Arc<B>,
    /// Bounds the number of chunk-store/fetch requests in flight at once to
    /// one, while still letting the next batch be spawned (and thus start
    /// waiting on the semaphore) before the previous batch's completion is
    /// awaited — the "double-buffered" pipelining spec.md §4.5 describes.
    in_flight: Arc<tokio::sync::Semaphore>,
}

impl<B: BlobBackend> BlobStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            in_flight: Arc::new(tokio::sync::Semaphore::new(1)),
        }
    }

    pub async fn create_file_blob(&self, path: &Path, store_large: bool) -> Result<FileBlob> {
        let data = tokio::fs::read(path).await?;
        let file_size = data.len() as u64;
        if file_size < LARGE_FILE_THRESHOLD {
            return Ok(FileBlob {
                kind: FileBlobKind::File,
                offset: 0,
                file_size,
                content: Some(data),
                chunk_hashes: Vec::new(),
                ref_hash: None,
            });
        }

        let offsets = chunk_offsets(file_size);
        let chunks: Vec<Vec<u8>> = offsets
            .iter()
            .map(|&offset| {
                let end = (offset + CHUNK_SIZE).min(file_size) as usize;
                data[offset as usize..end].to_vec()
            })
            .collect();
        let hashes: Vec<ContentHash> = chunks.iter().map(|c| ContentHash::of_bytes(c)).collect();

        if store_large {
            self.store_pipelined(hashes.clone(), chunks).await?;
        }

        Ok(FileBlob {
            kind: FileBlobKind::FileMeta,
            offset: 0,
            file_size,
            content: None,
            chunk_hashes: hashes,
            ref_hash: None,
        })
    }

    async fn store_pipelined(&self, hashes: Vec<ContentHash>, chunks: Vec<Vec<u8>>) -> Result<()> {
        let batches: Vec<Vec<(ContentHash, Vec<u8>)>> = hashes
            .into_iter()
            .zip(chunks)
            .collect::<Vec<_>>()
            .chunks(CHUNKS_PER_BATCH)
            .map(|c| c.to_vec())
            .collect();

        let mut previous: Option<tokio::task::JoinHandle<Result<()>>> = None;
        for batch in batches {
            let backend = self.backend.clone();
            let permit = self.in_flight.clone();
            let next = tokio::spawn(async move {
                let _permit = permit.acquire().await.map_err(|e| anyhow!("{e}"))?;
                for (hash, bytes) in batch {
                    backend.put_blob(hash, bytes).await?;
                }
                Ok(())
            });
            if let Some(prev) = previous.take() {
                prev.await.map_err(|e| anyhow!("{e}"))??;
            }
            previous = Some(next);
        }
        if let Some(last) = previous {
            last.await.map_err(|e| anyhow!("{e}"))??;
        }
        Ok(())
    }

    pub async fn output_file_blob(&self, blob: &FileBlob, sink: &BlobSink) -> Result<()> {
        blob.validate()?;
        match blob.kind {
            FileBlobKind::File => {
                let content = blob
                    .content
                    .as_ref()
                    .expect("validated FILE blob has content");
                sink.prepare(blob.file_size)?;
                sink.write_at(0, content)?;
                Ok(())
            }
            FileBlobKind::FileMeta => {
                sink.prepare(blob.file_size)?;
                self.fetch_pipelined(blob, sink).await
            }
            FileBlobKind::FileRef => {
                let hash = blob
                    .ref_hash
                    .clone()
                    .expect("validated FILE_REF blob has a ref_hash");
                let content = self
                    .backend
                    .get_blob(hash.clone())
                    .await?
                    .ok_or_else(|| anyhow!("FILE_REF target {hash} not found"))?;
                let resolved = FileBlob {
                    kind: FileBlobKind::File,
                    offset: 0,
                    file_size: content.len() as u64,
                    content: Some(content),
                    chunk_hashes: Vec::new(),
                    ref_hash: None,
                };
                Box::pin(self.output_file_blob(&resolved, sink)).await
            }
            FileBlobKind::FileChunk => Err(anyhow!("FILE_CHUNK is not a valid top-level blob")),
        }
    }

    async fn fetch_pipelined(&self, blob: &FileBlob, sink: &BlobSink) -> Result<()> {
        let offsets = chunk_offsets(blob.file_size);
        let work: Vec<(u64, ContentHash)> = offsets.into_iter().zip(blob.chunk_hashes.clone()).collect();
        let batches: Vec<Vec<(u64, ContentHash)>> = work
            .chunks(CHUNKS_PER_BATCH)
            .map(|c| c.to_vec())
            .collect();

        let mut previous: Option<tokio::task::JoinHandle<Result<Vec<(u64, Vec<u8>)>>>> = None;
        for batch in batches {
            let backend = self.backend.clone();
            let permit = self.in_flight.clone();
            let next = tokio::spawn(async move {
                let _permit = permit.acquire().await.map_err(|e| anyhow!("{e}"))?;
                let mut results = Vec::with_capacity(batch.len());
                for (offset, hash) in batch {
                    let bytes = backend
                        .get_blob(hash.clone())
                        .await?
                        .ok_or_else(|| anyhow!("chunk {hash} not found"))?;
                    results.push((offset, bytes));
                }
                Ok(results)
            });
            if let Some(prev) = previous.take() {
                let results = prev.await.map_err(|e| anyhow!("{e}"))??;
                for (offset, bytes) in results {
                    sink.write_at(offset, &bytes)?;
                }
            }
            previous = Some(next);
        }
        if let Some(last) = previous {
            let results = last.await.map_err(|e| anyhow!("{e}"))??;
            for (offset, bytes) in results {
                sink.write_at(offset, &bytes)?;
            }
        }
        Ok(())
    }
}
