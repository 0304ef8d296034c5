#![deny(clippy::unwrap_used)]

use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

use anyhow::Result;

use crate::path_utils::make_absolute;

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct ArArgs {
    pub flag_q: bool,
    pub flag_c: bool,
    pub flag_s: bool,
    pub thin_archive: bool,
    pub output: Option<PathBuf>,
    pub sources: Vec<PathBuf>,
}

impl ArArgs {
    pub fn parse_owned(cwd: &Path, raw_args: Vec<OsString>) -> Result<Self> {
        let raw_args: Vec<&OsStr> = raw_args.iter().map(|s| s.as_ref()).collect();
        Self::parse(cwd, raw_args.as_slice())
    }

    pub fn parse(cwd: &Path, raw_args: &[&OsStr]) -> Result<Self> {
        let mut args = Self::default();
        let mut raw_args_iter = raw_args.iter();
        let first_arg = raw_args_iter
            .next()
            .ok_or_else(|| anyhow::anyhow!("Missing first argument for ar command"))?;
        for c in first_arg.to_string_lossy().chars() {
            match c {
                'q' => args.flag_q = true,
                'c' => args.flag_c = true,
                's' => args.flag_s = true,
                'T' => args.thin_archive = true,
                _ => return Err(anyhow::anyhow!("Unknown ar flag: {}", c)),
            }
        }
        for raw_arg in raw_args_iter {
            let abs_path = make_absolute(cwd, Path::new(raw_arg));
            if args.output.is_none() {
                args.output = Some(abs_path);
            } else {
                args.sources.push(abs_path);
            }
        }
        Ok(args)
    }

    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![];
        let mut first_arg = OsString::from("");
        if self.flag_q {
            first_arg.push("q");
        }
        if self.flag_c {
            first_arg.push("c");
        }
        if self.flag_s {
            first_arg.push("s");
        }
        if self.thin_archive {
            first_arg.push("T");
        }
        args.push(first_arg);
        if let Some(output) = &self.output {
            args.push(output.as_os_str().into());
        }
        for arg in &self.sources {
            args.push(arg.as_os_str().into());
        }
        args
    }
}
