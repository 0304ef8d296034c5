#![deny(clippy::unwrap_used)]

//! Drives one compile request through the coordinator's task state machine
//! (§4.1): `Init -> Setup -> FileReq -> CallExec -> LocalRun -> LocalOutput
//! -> LocalFinished -> FileResp -> Finished`. A real remote dispatch path
//! would race alongside the local run and reconcile whichever finishes
//! first; the transport for that is out of scope here (spec.md's "RPC
//! transport" non-goal), so `CompileTask` models the state machine's local
//! half, using `OutputCache` as the memoization layer a remote client would
//! otherwise sit behind.

use std::{ffi::OsString, path::PathBuf};

use anyhow::Result;
use ccelerate_shared::WrappedBinary;
use futures::future::BoxFuture;

use crate::{
    content_hash::ContentHash,
    output_cache::{CachedOutput, OutputCache, OutputCacheKey},
    path_utils,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Init,
    Setup,
    FileReq,
    CallExec,
    LocalRun,
    LocalOutput,
    LocalFinished,
    FileResp,
    Finished,
}

pub struct CompileRequest {
    pub binary: WrappedBinary,
    pub cwd: PathBuf,
    pub args: Vec<OsString>,
}

pub struct CompileOutcome {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: i32,
    pub ran_locally: bool,
}

pub struct CompileTask<'a> {
    request: CompileRequest,
    output_cache: &'a OutputCache,
    state: TaskState,
}

impl<'a> CompileTask<'a> {
    pub fn new(request: CompileRequest, output_cache: &'a OutputCache) -> Self {
        Self {
            request,
            output_cache,
            state: TaskState::Init,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Runs the task to completion, serving a cached result for unchanged
    /// `(command, inputs)` without invoking `run_local`. `skip_cache_lookup`
    /// forces a fresh local run (the result still gets cached) for callers
    /// that can't trust a hit produced under a possibly different compiler.
    pub async fn run(
        &mut self,
        input_hashes: Vec<ContentHash>,
        output_path: PathBuf,
        skip_cache_lookup: bool,
        run_local: impl FnOnce() -> BoxFuture<'static, Result<CompileOutcome>>,
    ) -> Result<CompileOutcome> {
        self.state = TaskState::Setup;
        let cache_key = OutputCacheKey {
            command_hash: self.command_hash(),
            input_hashes,
        };

        self.state = TaskState::FileReq;
        if !skip_cache_lookup {
            if let Some(cached) = self.output_cache.get(&cache_key) {
                self.state = TaskState::FileResp;
                path_utils::ensure_directory_for_file(&output_path).await?;
                tokio::fs::write(&output_path, &cached.output_bytes).await?;
                self.state = TaskState::Finished;
                return Ok(CompileOutcome {
                    stdout: cached.stdout,
                    stderr: cached.stderr,
                    status: 0,
                    ran_locally: false,
                });
            }
        }

        self.state = TaskState::CallExec;
        self.state = TaskState::LocalRun;
        let outcome = run_local().await?;
        self.state = TaskState::LocalOutput;

        if outcome.status == 0 {
            if let Ok(output_bytes) = tokio::fs::read(&output_path).await {
                let output_hash = ContentHash::of_bytes(&output_bytes);
                let _ = self.output_cache.put(
                    &cache_key,
                    &CachedOutput {
                        output_path: output_path.clone(),
                        output_hash,
                        output_bytes,
                        stdout: outcome.stdout.clone(),
                        stderr: outcome.stderr.clone(),
                    },
                );
            }
        }
        self.state = TaskState::LocalFinished;
        self.state = TaskState::Finished;
        Ok(outcome)
    }

    fn command_hash(&self) -> ContentHash {
        let mut buf = format!("{:?}\0", self.request.binary).into_bytes();
        buf.extend(self.request.cwd.to_string_lossy().as_bytes());
        for arg in &self.request.args {
            buf.push(0);
            buf.extend(arg.to_string_lossy().as_bytes());
        }
        ContentHash::of_bytes(&buf)
    }
}
