#![deny(clippy::unwrap_used)]

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

pub fn make_absolute(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    base.join(path)
}

pub fn shorten_path(path: &Path) -> String {
    if let Some(path_name) = path.file_name() {
        path_name.to_string_lossy().to_string()
    } else {
        path.to_string_lossy().to_string()
    }
}

pub async fn ensure_directory_for_file(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// Resolves a bare binary name (e.g. `gcc`) to an absolute path by scanning
/// `$PATH`, the same lookup the shell performs before exec. Names that are
/// already a path (contain a separator) are returned unchanged.
pub fn resolve_in_path(binary: &OsStr) -> Option<PathBuf> {
    let path = Path::new(binary);
    if path.components().count() > 1 {
        return Some(path.to_path_buf());
    }
    let search_path = std::env::var_os("PATH")?;
    std::env::split_paths(&search_path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}
