#![deny(clippy::unwrap_used)]

use std::path::Path;

use anyhow::Result;
use sha2::{Digest, Sha256};

/// A SHA-256 digest, stored as lowercase hex. Used to identify blobs (§4.5),
/// directive-filtered file contents (§4.4), and compiler/subprogram binaries
/// (§4.3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hex_encode(&hasher.finalize()))
    }

    pub async fn of_file(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path).await?;
        Ok(Self::of_bytes(&data))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(out, "{byte:02x}").expect("writing to a String never fails");
    }
    out
}
