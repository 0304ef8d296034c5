#![deny(clippy::unwrap_used)]

//! Builds a compile's include graph (§4.2) by invoking the real
//! preprocessor rather than reimplementing macro expansion, conditional
//! inclusion, or `__has_include`: `local_code.rs`'s GCC line-marker walk
//! already turns the compiler's own `-E` output into the set of headers a
//! translation unit pulled in, and `preprocessor_directives.rs` strips
//! everything but directives so each header's contribution can be cached
//! and diffed cheaply. This module wires those two pieces together into
//! the dependency-cache-ready form.

use std::path::Path;

use anyhow::{Context, Result};
use bstr::ByteSlice;

use crate::{
    config::Config, content_hash::ContentHash, deps_cache::DepEntry, file_stat::FileStatCache,
    local_code::LocalCode, preprocessor_directives::extract_preprocessor_directives,
};

pub struct IncludeGraph {
    pub local_code: LocalCode,
    pub deps: Vec<DepEntry>,
}

/// Runs `preprocessed` (the compiler's own `-E` output for the translation
/// unit) through the local/global split and records a `DepEntry` — current
/// stat plus directive-filtered content hash — for every header pulled in,
/// so `DepsCache` can later tell whether any of them changed.
pub async fn resolve(
    preprocessed: &[u8],
    source_file_path: &Path,
    config: &Config,
    file_stats: &FileStatCache,
) -> Result<IncludeGraph> {
    let local_code = LocalCode::from_preprocessed_code(preprocessed.as_bstr(), source_file_path, config)
        .await
        .with_context(|| format!("splitting local code for {}", source_file_path.display()))?;

    let mut deps = Vec::with_capacity(local_code.global_includes.len());
    for header in &local_code.global_includes {
        deps.push(dep_entry_for(header, file_stats).await?);
    }
    Ok(IncludeGraph { local_code, deps })
}

async fn dep_entry_for(path: &Path, file_stats: &FileStatCache) -> Result<DepEntry> {
    let stat = file_stats.stat(path);
    let directive_hash = match tokio::fs::read(path).await {
        Ok(contents) => {
            let directives = extract_preprocessor_directives(contents.as_bstr())?;
            ContentHash::of_bytes(&directives)
        }
        Err(_) => ContentHash::of_bytes(b""),
    };
    Ok(DepEntry {
        path: path.to_path_buf(),
        stat,
        directive_hash,
    })
}

/// Same hash `dep_entry_for` records, recomputed synchronously from disk.
/// Used by `DepsCache::is_up_to_date` to decide whether a header whose stat
/// drifted still has unchanged directive content, without re-running the
/// preprocessor.
pub fn directive_hash_from_disk(path: &Path) -> Option<ContentHash> {
    let contents = std::fs::read(path).ok()?;
    let directives = extract_preprocessor_directives(contents.as_bstr()).ok()?;
    Some(ContentHash::of_bytes(&directives))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_global_includes_into_dep_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let header = dir.path().join("a.h");
        std::fs::write(&header, "#pragma once\nint a();\n").expect("write header");
        let source = dir.path().join("a.c");
        std::fs::write(&source, "#include \"a.h\"\n").expect("write source");

        let preprocessed = format!(
            "# 1 \"{src}\"\n# 1 \"{hdr}\" 1\nint a();\n# 2 \"{src}\" 2\n",
            src = source.display(),
            hdr = header.display(),
        );

        let config = Config::default();
        let file_stats = FileStatCache::default();
        let graph = resolve(preprocessed.as_bytes(), &source, &config, &file_stats)
            .await
            .expect("resolve");
        assert_eq!(graph.local_code.global_includes, vec![header.clone()]);
        assert_eq!(graph.deps.len(), 1);
        assert_eq!(graph.deps[0].path, header);
    }
}
