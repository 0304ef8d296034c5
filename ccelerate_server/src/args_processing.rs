use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

use anyhow::Result;
use anyhow::anyhow;
use ccelerate_shared::WrappedBinary;

use crate::{code_language::CodeLanguage, parse_gcc::GCCArgs};

#[derive(Debug)]
pub struct BuildObjectFileInfo {
    pub source_path: PathBuf,
    pub source_language: CodeLanguage,
    pub object_path: PathBuf,
}

impl BuildObjectFileInfo {
    pub fn from_args(
        binary: WrappedBinary,
        cwd: &Path,
        args: &[impl AsRef<OsStr>],
    ) -> Result<Self> {
        match binary {
            WrappedBinary::Gcc
            | WrappedBinary::Gxx
            | WrappedBinary::Clang
            | WrappedBinary::Clangxx => Self::from_gcc_args(cwd, args),
            _ => Err(anyhow!(
                "Cannot extract build object args for binary: {:?}",
                binary
            )),
        }
    }

    fn from_gcc_args(cwd: &Path, args: &[impl AsRef<OsStr>]) -> Result<Self> {
        let gcc_args = GCCArgs::parse(cwd, args)?;
        if !gcc_args.stop_before_link {
            return Err(anyhow!("Expected a -c compile-to-object invocation"));
        }
        if gcc_args.sources.len() > 1 {
            return Err(anyhow!(
                "multiple input file names in a single -c invocation are not supported"
            ));
        }
        let source = gcc_args
            .sources
            .first()
            .ok_or_else(|| anyhow!("Expected exactly one source file, got none"))?;
        let object_path = gcc_args
            .primary_output
            .ok_or_else(|| anyhow!("Expected an -o output path"))?;
        Ok(Self {
            source_path: source.path.clone(),
            source_language: source.language()?,
            object_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<std::ffi::OsString> {
        parts.iter().map(std::ffi::OsString::from).collect()
    }

    #[test]
    fn rejects_more_than_one_source_file() {
        let cwd = Path::new("/tmp");
        let err = BuildObjectFileInfo::from_args(
            WrappedBinary::Gcc,
            cwd,
            &args(&["-c", "a.c", "b.c", "-o", "a.o"]),
        )
        .expect_err("multiple sources must be rejected");
        assert!(err.to_string().contains("multiple input file names"));
    }

    #[test]
    fn accepts_a_single_source_file() {
        let cwd = Path::new("/tmp");
        let info = BuildObjectFileInfo::from_args(
            WrappedBinary::Gcc,
            cwd,
            &args(&["-c", "a.c", "-o", "a.o"]),
        )
        .expect("single source should be accepted");
        assert_eq!(info.source_path, Path::new("/tmp/a.c"));
    }
}
