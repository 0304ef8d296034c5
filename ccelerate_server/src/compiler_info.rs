#![deny(clippy::unwrap_used)]

//! Data types and discovery for compiler metadata (§4.3). A compiler's
//! identity for caching purposes is its resolved path plus the flags and
//! environment variables that can change what it reports
//! (`CompilerInfoKey`); discovery runs the toolchain itself to learn its
//! version, target, predefined macros and system include search path,
//! grounded on the key/value split in the original coordinator's
//! `compiler_info_cache.cc`/`compiler_info.cc`.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use ccelerate_shared::WrappedBinary;

use crate::content_hash::ContentHash;

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CompilerInfoKey {
    pub local_compiler_path: PathBuf,
    pub compiler_info_flags: Vec<String>,
    pub key_envs: Vec<(String, String)>,
    pub lang: String,
    pub cwd: PathBuf,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CompilerInfo {
    pub real_compiler_path: PathBuf,
    pub version: String,
    pub target: String,
    pub system_include_dirs: Vec<PathBuf>,
    pub predefined_macros: Vec<(String, String)>,
    pub compiler_hash: ContentHash,
}

/// `kNegativeCacheDuration` in the original coordinator: a failed discovery
/// is remembered for this long before being retried.
pub const NEGATIVE_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Follows symlinks to find the real compiler binary, capped the same way
/// the original coordinator bounds its resource resolution (8 hops).
pub async fn resolve_real_compiler_path(path: &Path) -> Result<PathBuf> {
    let mut current = path.to_path_buf();
    for _ in 0..8 {
        match tokio::fs::symlink_metadata(&current).await {
            Ok(meta) if meta.file_type().is_symlink() => {
                let target = tokio::fs::read_link(&current).await?;
                current = if target.is_absolute() {
                    target
                } else {
                    current
                        .parent()
                        .ok_or_else(|| anyhow!("{} has no parent", current.display()))?
                        .join(target)
                };
            }
            Ok(_) => return Ok(current),
            Err(_) => return Ok(current),
        }
    }
    Err(anyhow!(
        "too many levels of symlinks resolving {}",
        path.display()
    ))
}

pub async fn discover(_binary: WrappedBinary, key: &CompilerInfoKey) -> Result<CompilerInfo> {
    let real_path = resolve_real_compiler_path(&key.local_compiler_path)
        .await
        .with_context(|| {
            format!(
                "resolving compiler path {}",
                key.local_compiler_path.display()
            )
        })?;
    let compiler_hash = ContentHash::of_file(&real_path)
        .await
        .with_context(|| format!("hashing compiler at {}", real_path.display()))?;

    let version = run_for_stdout(&real_path, &["-dumpversion"], &key.cwd)
        .await
        .unwrap_or_default()
        .trim()
        .to_string();
    let target = run_for_stdout(&real_path, &["-dumpmachine"], &key.cwd)
        .await
        .unwrap_or_default()
        .trim()
        .to_string();

    let defines_output = run_for_stdout(
        &real_path,
        &["-E", "-dM", "-x", &key.lang, "/dev/null"],
        &key.cwd,
    )
    .await
    .unwrap_or_default();
    let predefined_macros = parse_macro_dump(&defines_output);

    let verbose_output = run_for_stderr(
        &real_path,
        &["-E", "-Wp,-v", "-x", &key.lang, "/dev/null"],
        &key.cwd,
    )
    .await
    .unwrap_or_default();
    let system_include_dirs = parse_include_search_path(&verbose_output);

    Ok(CompilerInfo {
        real_compiler_path: real_path,
        version,
        target,
        system_include_dirs,
        predefined_macros,
        compiler_hash,
    })
}

async fn run_for_stdout(compiler: &Path, args: &[&str], cwd: &Path) -> Result<String> {
    let output = tokio::process::Command::new(compiler)
        .args(args)
        .current_dir(cwd)
        .output()
        .await?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

async fn run_for_stderr(compiler: &Path, args: &[&str], cwd: &Path) -> Result<String> {
    let output = tokio::process::Command::new(compiler)
        .args(args)
        .current_dir(cwd)
        .output()
        .await?;
    Ok(String::from_utf8_lossy(&output.stderr).into_owned())
}

fn parse_macro_dump(dump: &str) -> Vec<(String, String)> {
    dump.lines()
        .filter_map(|line| line.strip_prefix("#define "))
        .filter_map(|rest| rest.split_once(' '))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

fn parse_include_search_path(verbose: &str) -> Vec<PathBuf> {
    let mut in_list = false;
    let mut dirs = Vec::new();
    for line in verbose.lines() {
        if line.contains("search starts here") {
            in_list = true;
            continue;
        }
        if line.starts_with("End of search list") {
            break;
        }
        if in_list {
            dirs.push(PathBuf::from(line.trim()));
        }
    }
    dirs
}
