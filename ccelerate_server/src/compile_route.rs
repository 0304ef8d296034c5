#![deny(clippy::unwrap_used)]

//! Routes one `/run` request (a wrapped `gcc`/`g++`/`clang`/`clang++`/`ar`
//! invocation) through the coordinator. Compile-to-object invocations go
//! through `compile_task::CompileTask`'s state machine, with the
//! include-graph resolver, compiler-info cache, and dependency cache
//! feeding it the input set the output cache is keyed on. Every other
//! invocation (archiving, linking) runs the real command directly: chunked
//! remote linking is the teacher's own build-system-specific optimization
//! and is out of scope here (spec.md's "RPC transport" non-goal covers the
//! remote dispatch path these would otherwise need).

use std::sync::Arc;

use anyhow::{Context, Result};
use ccelerate_shared::{CacheHit, CommandSpec, RunRequestData, RunResponseData};
use futures::future::BoxFuture;

use crate::{
    args_processing::BuildObjectFileInfo,
    command::Command,
    compile_task::{CompileOutcome, CompileRequest, CompileTask},
    compiler_info::CompilerInfoKey,
    content_hash::ContentHash,
    deps_cache::DepsIdentifier,
    include_resolver,
    state::State,
    task_log::log_task,
    task_periods::TaskPeriodInfo,
};

struct CompileObjectTaskInfo {
    object_path: std::path::PathBuf,
}

impl TaskPeriodInfo for CompileObjectTaskInfo {
    fn category(&self) -> String {
        "Compile".to_string()
    }

    fn terminal_one_liner(&self) -> String {
        crate::path_utils::shorten_path(&self.object_path)
    }

    fn log_detailed(&self) {
        log::info!("Compile: {}", self.object_path.to_string_lossy());
    }
}

pub async fn run(request: RunRequestData, state: &Arc<State>) -> Result<RunResponseData> {
    if request.args.is_empty() {
        return Ok(RunResponseData {
            stdout: Vec::new(),
            stderr: b"Unsupported command\n".to_vec(),
            status: 1,
            ..Default::default()
        });
    }

    let raw_args: Vec<&std::ffi::OsStr> = request.args.iter().map(|a| a.as_ref()).collect();

    // `-`/`/dev/stdin` sources read from standard input (§8). `GCCArgs::parse`
    // doesn't recognize `-` as a source file, and the cache/compile-task path
    // has nothing to content-address for piped input anyway, so these are
    // spawned verbatim with real stdin before any argument parsing happens.
    let reads_stdin = request
        .args
        .iter()
        .any(|arg| arg == "-" || arg == "/dev/stdin");
    if reads_stdin {
        return run_raw_command_locally(
            &request.binary.to_standard_binary_name().to_string_lossy(),
            &request.cwd,
            &raw_args,
        )
        .await;
    }

    let command = Command::new(
        &request.binary.to_standard_binary_name().to_string_lossy(),
        &request.cwd,
        &raw_args,
    )?;

    let is_compile_to_object = matches!(
        &command.args,
        crate::command::CommandArgs::Gcc(gcc) if gcc.stop_before_link
    );

    if request.binary.is_gcc_compatible() && is_compile_to_object {
        return run_compile_object(request, state).await;
    }

    run_command_locally(command).await
}

async fn run_command_locally(command: Command) -> Result<RunResponseData> {
    let child = command.run()?;
    let output = child.wait_with_output().await?;
    Ok(RunResponseData {
        stdout: output.stdout,
        stderr: output.stderr,
        status: output.status.code().unwrap_or(1),
        ..Default::default()
    })
}

async fn run_raw_command_locally(
    binary: &str,
    cwd: &std::path::Path,
    raw_args: &[&std::ffi::OsStr],
) -> Result<RunResponseData> {
    let output = tokio::process::Command::new(binary)
        .args(raw_args)
        .current_dir(cwd)
        .stdin(std::process::Stdio::inherit())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()?
        .wait_with_output()
        .await?;
    Ok(RunResponseData {
        stdout: output.stdout,
        stderr: output.stderr,
        status: output.status.code().unwrap_or(1),
        ..Default::default()
    })
}

async fn run_compile_object(
    request: RunRequestData,
    state: &Arc<State>,
) -> Result<RunResponseData> {
    let args_info =
        BuildObjectFileInfo::from_args(request.binary, &request.cwd, &request.args)?;

    let _task_period = log_task(
        CompileObjectTaskInfo {
            object_path: args_info.object_path.clone(),
        },
        state,
    );

    let standard_name = request.binary.to_standard_binary_name();
    let local_compiler_path = crate::path_utils::resolve_in_path(&standard_name)
        .unwrap_or_else(|| std::path::PathBuf::from(&standard_name));
    let compiler_key = CompilerInfoKey {
        local_compiler_path,
        compiler_info_flags: Vec::new(),
        key_envs: Vec::new(),
        lang: args_info.source_language.valid_ext().to_string(),
        cwd: request.cwd.clone(),
    };
    let compiler_info = state
        .compiler_info_cache
        .get(request.binary, &compiler_key)
        .await
        .context("resolving compiler info")?;

    let standard_name_str = standard_name.to_string_lossy();
    let policy = state.config.lock().mismatch_policy(&request.cwd);
    // `Fallback` means the compiler identity looks different enough that a
    // previous cache entry can't be trusted blindly; it still runs the
    // compiler and still populates the cache for next time, but it must not
    // serve a hit that was produced under the old (possibly different)
    // compiler, so the output-cache lookup below is skipped for it alone.
    let skip_cache_lookup = match crate::compiler_mismatch::check(
        policy,
        &request.command_spec,
        &compiler_info,
        &standard_name_str,
    ) {
        crate::compiler_mismatch::MismatchOutcome::Match => false,
        crate::compiler_mismatch::MismatchOutcome::Warn(message) => {
            log::warn!("{message}");
            false
        }
        crate::compiler_mismatch::MismatchOutcome::Fallback(message) => {
            log::warn!("{message}, forcing a fresh local compile");
            true
        }
        crate::compiler_mismatch::MismatchOutcome::Reject(message) => {
            return Err(anyhow::anyhow!(message));
        }
    };

    let source_hash = ContentHash::of_file(&args_info.source_path)
        .await
        .context("hashing source file")?;
    let deps_id = DepsIdentifier(args_info.object_path.to_string_lossy().to_string());
    let cached_deps = state.deps_cache.get(&deps_id);
    let reusable_deps = cached_deps.filter(|entry| {
        entry.source_hash == source_hash
            && state.deps_cache.is_up_to_date(
                &entry.deps,
                |p| state.file_stats.stat(p),
                |p| include_resolver::directive_hash_from_disk(p),
            )
    });

    let (deps, local_code_hash) = if let Some(entry) = reusable_deps {
        (entry.deps, entry.local_code_hash)
    } else {
        let preprocess_args = build_preprocess_args(&request.args);
        let preprocessed = run_preprocessor(&request, &preprocess_args).await?;

        let graph = include_resolver::resolve(
            &preprocessed,
            &args_info.source_path,
            &state.config.lock(),
            &state.file_stats,
        )
        .await
        .context("resolving include graph")?;

        let local_code_hash = ContentHash::of_bytes(graph.local_code.local_code.as_ref());
        state.deps_cache.put(
            &deps_id,
            &crate::deps_cache::DepsCacheEntry {
                source_hash,
                local_code_hash: local_code_hash.clone(),
                deps: graph.deps.clone(),
            },
        )?;
        (graph.deps, local_code_hash)
    };

    let mut input_hashes = vec![local_code_hash];
    for dep in &deps {
        input_hashes.push(dep.directive_hash.clone());
    }

    let object_path = args_info.object_path.clone();
    let binary = request.binary;
    let cwd = request.cwd.clone();
    let args = request.args.clone();

    let mut task = CompileTask::new(
        CompileRequest {
            binary,
            cwd: cwd.clone(),
            args: args.clone(),
        },
        &state.output_cache,
    );
    let outcome = task
        .run(input_hashes, object_path.clone(), skip_cache_lookup, move || -> BoxFuture<'static, Result<CompileOutcome>> {
            Box::pin(async move {
                let child = tokio::process::Command::new(binary.to_standard_binary_name())
                    .args(&args)
                    .current_dir(&cwd)
                    .stdin(std::process::Stdio::null())
                    .stdout(std::process::Stdio::piped())
                    .stderr(std::process::Stdio::piped())
                    .spawn()?;
                let output = child.wait_with_output().await?;
                Ok(CompileOutcome {
                    stdout: output.stdout,
                    stderr: output.stderr,
                    status: output.status.code().unwrap_or(1),
                    ran_locally: true,
                })
            })
        })
        .await?;

    if outcome.status == 0 {
        _task_period.finished_successfully();
    }

    let binary_size = tokio::fs::metadata(&compiler_info.real_compiler_path)
        .await
        .map(|meta| meta.len())
        .unwrap_or(0);
    let result_command_spec = Some(CommandSpec {
        name: request.binary.to_standard_binary_name().to_string_lossy().into_owned(),
        version: compiler_info.version.clone(),
        target: compiler_info.target.clone(),
        local_compiler_path: compiler_info.real_compiler_path.to_string_lossy().into_owned(),
        binary_hash: compiler_info.compiler_hash.as_str().to_string(),
        size: binary_size,
    });

    Ok(RunResponseData {
        stdout: outcome.stdout,
        stderr: outcome.stderr,
        status: outcome.status,
        cache_hit: if outcome.ran_locally {
            CacheHit::NoCache
        } else {
            CacheHit::LocalOutputCache
        },
        missing_input: Vec::new(),
        result_command_spec,
    })
}

/// Rewrites a compile-to-object invocation into one that emits preprocessed
/// code on stdout: drops `-c`/`-S` and any `-o <path>`, then appends `-E`.
fn build_preprocess_args(args: &[std::ffi::OsString]) -> Vec<std::ffi::OsString> {
    let mut out = Vec::with_capacity(args.len() + 1);
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "-c" || arg == "-S" {
            continue;
        }
        if arg == "-o" {
            iter.next();
            continue;
        }
        out.push(arg.clone());
    }
    out.push("-E".into());
    out
}

async fn run_preprocessor(
    request: &RunRequestData,
    preprocess_args: &[std::ffi::OsString],
) -> Result<Vec<u8>> {
    let child = tokio::process::Command::new(request.binary.to_standard_binary_name())
        .args(preprocess_args)
        .current_dir(&request.cwd)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()?;
    let output = child.wait_with_output().await?;
    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "Preprocessing failed: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cli;

    fn test_cli() -> Cli {
        Cli {
            jobs: 1,
            data_dir: None,
            address: "127.0.0.1:0".to_string(),
            no_tui: true,
        }
    }

    async fn test_state() -> (tempfile::TempDir, Arc<State>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = State::new(test_cli(), "127.0.0.1:0".to_string(), dir.path().to_path_buf())
            .await
            .expect("state");
        (dir, Arc::new(state))
    }

    #[test]
    fn build_preprocess_args_strips_compile_flags_and_appends_e() {
        let args: Vec<std::ffi::OsString> = vec![
            "-c".into(),
            "a.c".into(),
            "-o".into(),
            "a.o".into(),
            "-Wall".into(),
        ];
        let out = build_preprocess_args(&args);
        assert_eq!(out, vec!["a.c", "-Wall", "-E"]);
    }

    #[tokio::test]
    async fn routes_a_plain_preprocess_invocation_to_the_local_command() {
        let (dir, state) = test_state().await;
        let source = dir.path().join("a.c");
        std::fs::write(&source, "int a() { return 1; }\n").expect("write source");

        let request = RunRequestData {
            binary: ccelerate_shared::WrappedBinary::Gcc,
            args: vec!["-E".into(), "a.c".into()],
            cwd: dir.path().to_path_buf(),
            requester: ccelerate_shared::RequesterInfo::current(dir.path().to_string_lossy()),
            command_spec: ccelerate_shared::CommandSpec::default(),
        };
        let response = run(request, &state).await.expect("run");
        assert_eq!(response.status, 0);
        assert!(String::from_utf8_lossy(&response.stdout).contains("a()"));
    }

    #[tokio::test]
    async fn compiles_an_object_file_through_the_compile_task_and_caches_the_replay() {
        let (dir, state) = test_state().await;
        let source = dir.path().join("a.c");
        std::fs::write(&source, "int a() { return 1; }\n").expect("write source");

        let request = || RunRequestData {
            binary: ccelerate_shared::WrappedBinary::Gcc,
            args: vec!["-c".into(), "a.c".into(), "-o".into(), "a.o".into()],
            cwd: dir.path().to_path_buf(),
            requester: ccelerate_shared::RequesterInfo::current(dir.path().to_string_lossy()),
            command_spec: ccelerate_shared::CommandSpec::default(),
        };

        let response = run(request(), &state).await.expect("run");
        assert_eq!(response.status, 0, "{}", String::from_utf8_lossy(&response.stderr));
        assert_eq!(response.cache_hit, CacheHit::NoCache);
        assert!(response.result_command_spec.is_some());
        assert!(dir.path().join("a.o").exists());
        let original_object = std::fs::read(dir.path().join("a.o")).expect("read object");

        std::fs::remove_file(dir.path().join("a.o")).expect("remove object");
        let response2 = run(request(), &state).await.expect("run2");
        assert_eq!(response2.status, 0);
        assert_eq!(response2.cache_hit, CacheHit::LocalOutputCache);
        assert_eq!(
            std::fs::read(dir.path().join("a.o")).expect("a cached replay must rewrite the object file"),
            original_object,
            "a cached replay must restore the exact bytes the original compile produced"
        );
    }

    #[tokio::test]
    async fn empty_argv_is_rejected_without_running_anything() {
        let (dir, state) = test_state().await;
        let request = RunRequestData {
            binary: ccelerate_shared::WrappedBinary::Gcc,
            args: Vec::new(),
            cwd: dir.path().to_path_buf(),
            requester: ccelerate_shared::RequesterInfo::current(dir.path().to_string_lossy()),
            command_spec: ccelerate_shared::CommandSpec::default(),
        };
        let response = run(request, &state).await.expect("run");
        assert_eq!(response.status, 1);
        assert!(String::from_utf8_lossy(&response.stderr).contains("Unsupported command"));
    }

    #[tokio::test]
    async fn stdin_source_is_forced_onto_the_local_path_instead_of_the_compile_task() {
        let (dir, state) = test_state().await;
        let request = RunRequestData {
            binary: ccelerate_shared::WrappedBinary::Gcc,
            args: vec![
                "-x".into(),
                "c".into(),
                "-c".into(),
                "-".into(),
                "-o".into(),
                "a.o".into(),
            ],
            cwd: dir.path().to_path_buf(),
            requester: ccelerate_shared::RequesterInfo::current(dir.path().to_string_lossy()),
            command_spec: ccelerate_shared::CommandSpec::default(),
        };
        let response = run(request, &state).await.expect("run");
        assert_eq!(response.status, 0, "{}", String::from_utf8_lossy(&response.stderr));
        assert_eq!(response.cache_hit, CacheHit::NoCache);
        assert!(response.result_command_spec.is_none());
    }
}
