#![deny(clippy::unwrap_used)]

use anyhow::Result;
use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

use crate::{code_language::CodeLanguage, path_utils::make_absolute, source_file::SourceFile};

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct GCCArgs {
    pub sources: Vec<SourceFile>,
    pub primary_output: Option<PathBuf>,
    pub user_includes: Vec<PathBuf>,
    pub system_includes: Vec<PathBuf>,
    pub defines: Vec<String>,
    pub warnings: Vec<String>,
    pub machine_args: Vec<String>,
    pub pipe: bool,
    pub f_flags: Vec<String>,
    pub g_flags: Vec<String>,
    pub opt_flags: Vec<String>,
    pub lang_std: Option<String>,
    pub depfile_generate: bool,
    pub depfile_output_path: Option<PathBuf>,
    pub depfile_target_name: Option<String>,
    pub stop_before_link: bool,
    pub stop_before_assemble: bool,
    pub stop_after_preprocessing: bool,
    pub shared: bool,
    pub libraries: Vec<String>,
    pub no_pie: bool,
    pub link_dirs: Vec<PathBuf>,
    pub linker_args: Vec<OsString>,
    pub print_sysroot: bool,
    pub flag_v: bool,
    pub include_files: Vec<SourceFile>,
    pub aa_flag: bool,
    pub target_flags: Vec<String>,
    pub cxx_flag: bool,
    pub ecxx_flag: bool,
    pub openmp_flag: bool,
    pub use_link_group: bool,
    pub preprocess_keep_defines: bool,
}

impl GCCArgs {
    pub fn parse<S: AsRef<OsStr>>(cwd: &Path, raw_args: &[S]) -> Result<Self> {
        let mut args = Self::default();

        let mut last_language = None;

        let mut raw_args_iter = raw_args.iter();
        while let Some(raw_arg) = raw_args_iter.next() {
            let arg_str = raw_arg.as_ref().to_str().ok_or_else(|| {
                anyhow::anyhow!(
                    "Failed to convert OsStr to str for arg: {}",
                    raw_arg.as_ref().to_string_lossy()
                )
            })?;
            if let Some(definition) = arg_str.strip_prefix("-D") {
                args.defines.push(definition.to_string());
            } else if let Some(path) = arg_str.strip_prefix("-I") {
                args.user_includes.push(make_absolute(cwd, Path::new(path)));
            } else if arg_str.starts_with("-isystem") {
                let path = raw_args_iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing path after -isystem"))?;
                args.system_includes
                    .push(make_absolute(cwd, Path::new(path)));
            } else if let Some(linker_arg) = arg_str.strip_prefix("-Wl,") {
                let mut arg_split = linker_arg.split(",");
                for linker_arg in arg_split.by_ref() {
                    args.linker_args.push(linker_arg.into());
                }
            } else if arg_str.starts_with("-W") {
                args.warnings.push(arg_str.to_string());
            } else if arg_str.starts_with("--target") {
                args.target_flags.push(arg_str.to_string());
            } else if arg_str.starts_with("-m") {
                args.machine_args.push(arg_str.to_string());
            } else if arg_str == "-pipe" {
                args.pipe = true;
            } else if arg_str == "-shared" {
                args.shared = true;
            } else if arg_str == "-print-sysroot" {
                args.print_sysroot = true;
            } else if arg_str == "-v" {
                args.flag_v = true;
            } else if arg_str == "-Aa" {
                args.aa_flag = true;
            } else if arg_str == "--c++" {
                args.cxx_flag = true;
            } else if arg_str == "--ec++" {
                args.ecxx_flag = true;
            } else if arg_str == "--openmp" {
                args.openmp_flag = true;
            } else if arg_str == "-dD" {
                args.preprocess_keep_defines = true;
            } else if arg_str == "-x" {
                let name = raw_args_iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing name"))?
                    .as_ref();
                let name = name.to_string_lossy().to_string();
                last_language = CodeLanguage::from_gcc_x_arg(&name)?;
            } else if arg_str == "-include" {
                let path = raw_args_iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing path for -include flag"))?;
                args.include_files.push(SourceFile {
                    path: make_absolute(cwd, Path::new(path)),
                    language_override: last_language,
                });
            } else if arg_str.starts_with("-f") {
                args.f_flags.push(arg_str.to_string());
            } else if arg_str.starts_with("-O") {
                args.opt_flags.push(arg_str.to_string());
            } else if arg_str.starts_with("-std=") {
                args.lang_std = Some(arg_str.to_string());
            } else if arg_str == "-MD" {
                args.depfile_generate = true;
            } else if arg_str == "-MT" {
                let name = raw_args_iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing name"))?
                    .as_ref();
                let name = name.to_string_lossy().to_string();
                args.depfile_target_name = Some(name);
            } else if arg_str == "-MF" {
                let path = raw_args_iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing path for -MF flag"))?;
                args.depfile_output_path = Some(make_absolute(cwd, Path::new(path)));
            } else if arg_str == "-o" {
                let path = raw_args_iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing path for -o flag"))?;
                args.primary_output = Some(make_absolute(cwd, Path::new(path)));
            } else if arg_str == "-c" {
                args.stop_before_link = true;
            } else if arg_str == "-S" {
                args.stop_before_assemble = true;
            } else if arg_str == "-E" {
                args.stop_after_preprocessing = true;
            } else if arg_str.starts_with("-g") {
                args.g_flags.push(arg_str.to_string());
            } else if let Some(library) = arg_str.strip_prefix("-l") {
                args.libraries.push(library.to_string());
            } else if arg_str == "-no-pie" {
                args.no_pie = true;
            } else if let Some(link_dir) = arg_str.strip_prefix("-L") {
                args.link_dirs.push(make_absolute(cwd, Path::new(link_dir)));
            } else if arg_str.starts_with("-Xlinker") {
                let arg = raw_args_iter.next().ok_or_else(|| {
                    anyhow::anyhow!("Missing argument for -Xlinker flag: {}", arg_str)
                })?;
                args.linker_args.push(arg.into());
            } else if arg_str.starts_with("-") {
                return Err(anyhow::anyhow!("Unknown GCC flag: {}", arg_str));
            } else {
                let path = make_absolute(cwd, Path::new(raw_arg));
                args.sources.push(SourceFile {
                    path,
                    language_override: last_language,
                });
            }
        }
        Ok(args)
    }

    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![];
        if self.stop_before_link {
            args.push("-c".into());
        }
        if self.stop_before_assemble {
            args.push("-S".into());
        }
        if self.stop_after_preprocessing {
            args.push("-E".into());
        }
        if self.pipe {
            args.push("-pipe".into());
        }
        if self.shared {
            args.push("-shared".into());
        }
        if self.no_pie {
            args.push("-no-pie".into());
        }
        if self.preprocess_keep_defines {
            args.push("-dD".into());
        }
        if self.print_sysroot {
            args.push("-print-sysroot".into());
        }
        for flag in &self.target_flags {
            args.push(flag.into());
        }
        if self.aa_flag {
            args.push("-Aa".into());
        }
        if self.flag_v {
            args.push("-v".into());
        }
        if self.cxx_flag {
            args.push("--c++".into());
        }
        if self.ecxx_flag {
            args.push("--ec++".into());
        }
        if self.openmp_flag {
            args.push("--openmp".into());
        }
        if let Some(lang_std) = &self.lang_std {
            args.push(lang_std.into());
        }
        for arg in &self.opt_flags {
            args.push(arg.into());
        }
        for arg in &self.g_flags {
            args.push(arg.into());
        }
        for arg in &self.f_flags {
            args.push(arg.into());
        }
        for arg in &self.libraries {
            let mut combined = OsString::from("-l");
            combined.push(arg);
            args.push(combined);
        }
        if self.depfile_generate {
            args.push("-MD".into());
        }
        if let Some(name) = &self.depfile_target_name {
            args.push("-MT".into());
            args.push(name.into());
        }
        if let Some(path) = &self.depfile_output_path {
            args.push("-MF".into());
            args.push(path.as_os_str().into());
        }
        for arg in &self.warnings {
            args.push(arg.into());
        }
        for arg in &self.machine_args {
            args.push(arg.into());
        }
        for arg in &self.defines {
            let mut combined = OsString::from("-D");
            combined.push(arg);
            args.push(combined);
        }
        for arg in &self.user_includes {
            let mut combined = OsString::from("-I");
            combined.push(arg.as_os_str());
            args.push(combined);
        }
        for arg in &self.system_includes {
            args.push("-isystem".into());
            args.push(arg.as_os_str().into());
        }
        for arg in &self.link_dirs {
            let mut combined = OsString::from("-L");
            combined.push(arg.as_os_str());
            args.push(combined);
        }
        for arg in &self.linker_args {
            args.push("-Xlinker".into());
            args.push(arg.clone());
        }

        let mut last_language = None;

        for arg in &self.include_files {
            self.to_args_update_language(&mut last_language, &arg.language_override, &mut args);
            args.push("-include".into());
            args.push(arg.path.as_os_str().into());
        }
        if let Some(path) = &self.primary_output {
            args.push("-o".into());
            args.push(path.as_os_str().into());
        }
        if self.use_link_group {
            args.push("-Wl,--start-group".into());
        }
        for arg in &self.sources {
            self.to_args_update_language(&mut last_language, &arg.language_override, &mut args);
            args.push(arg.path.as_os_str().into());
        }
        if self.use_link_group {
            args.push("-Wl,--end-group".into());
        }
        args
    }

    fn to_args_update_language(
        &self,
        last_language: &mut Option<CodeLanguage>,
        new_language: &Option<CodeLanguage>,
        args: &mut Vec<OsString>,
    ) {
        if last_language != new_language {
            args.push("-x".into());
            if let Some(language) = &new_language {
                args.push(language.to_x_arg().into());
            } else {
                args.push("none".into());
            }
            *last_language = *new_language;
        }
    }
}
