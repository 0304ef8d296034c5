#![deny(clippy::unwrap_used)]

use std::path::Path;

use anyhow::*;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CodeLanguage {
    // C code.
    C,
    // C++ code.
    Cxx,
    // Preprocessed C code.
    I,
    // Preprocessed C++ code.
    II,
}

impl CodeLanguage {
    pub fn from_ext(ext: &str) -> Result<Self> {
        match ext {
            "c" => Ok(Self::C),
            "cc" | "cp" | "cpp" | "cxx" | "c++" => Ok(Self::Cxx),
            "i" => Ok(Self::I),
            "ii" => Ok(Self::II),
            _ => Err(anyhow!("Unknown language extension: {}", ext)),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| anyhow!("Failed to get extension of {}", path.display()))?;
        Self::from_ext(ext)
    }

    pub fn valid_ext(self) -> &'static str {
        self.to_valid_ext()
    }

    pub fn to_valid_ext(self) -> &'static str {
        match self {
            Self::C => "c",
            Self::Cxx => "cc",
            Self::I => "i",
            Self::II => "ii",
        }
    }

    pub fn from_gcc_x_arg(arg: &str) -> Result<Option<Self>> {
        Self::from_x_arg(arg)
    }

    pub fn from_x_arg(arg: &str) -> Result<Option<Self>> {
        match arg {
            "c" => Ok(Some(Self::C)),
            "c++" => Ok(Some(Self::Cxx)),
            "cpp-output" => Ok(Some(Self::I)),
            "c++-cpp-output" => Ok(Some(Self::II)),
            "none" => Ok(None),
            _ => Err(anyhow!("Unknown language {}", arg)),
        }
    }

    pub fn to_x_arg(self) -> &'static str {
        match self {
            Self::C => "c",
            Self::Cxx => "c++",
            Self::I => "cpp-output",
            Self::II => "c++-cpp-output",
        }
    }

    /// `I`/`II` are already preprocessed; going further is a no-op error, matching
    /// how the driver refuses to preprocess a `.i`/`.ii` file a second time.
    pub fn to_preprocessed(self) -> Result<CodeLanguage> {
        match self {
            Self::C => Ok(Self::I),
            Self::Cxx => Ok(Self::II),
            _ => Err(anyhow!("Cannot preprocess language {:?}", self)),
        }
    }

    pub fn to_non_preprocessed(self) -> Result<CodeLanguage> {
        match self {
            Self::I => Ok(Self::C),
            Self::II => Ok(Self::Cxx),
            _ => Err(anyhow!("Language {:?} is already non-preprocessed", self)),
        }
    }
}
