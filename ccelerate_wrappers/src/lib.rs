#![deny(clippy::unwrap_used)]

use std::{
    io::Write,
    path::{Path, PathBuf},
    process::exit,
};

use sha2::{Digest, Sha256};

/// Resolves `binary` to an absolute path by scanning `$PATH`, the same
/// lookup that will happen again (possibly with a different result) when
/// the coordinator handles the request.
fn resolve_in_path(binary: &str) -> Option<PathBuf> {
    let path = Path::new(binary);
    if path.components().count() > 1 {
        return Some(path.to_path_buf());
    }
    let search_path = std::env::var_os("PATH")?;
    std::env::split_paths(&search_path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

/// Builds the caller's belief about which compiler it's invoking, cheaply
/// (no subprocess): resolved path, file size, and a content hash. Version
/// and target are left blank since determining them would mean running
/// the compiler, which defeats the point of dispatching it elsewhere.
fn command_spec(binary: ccelerate_shared::WrappedBinary) -> ccelerate_shared::CommandSpec {
    let name = binary.to_standard_binary_name().to_string_lossy().into_owned();
    let Some(resolved) = resolve_in_path(&name) else {
        return ccelerate_shared::CommandSpec {
            name,
            ..Default::default()
        };
    };
    let Ok(bytes) = std::fs::read(&resolved) else {
        return ccelerate_shared::CommandSpec {
            name,
            local_compiler_path: resolved.to_string_lossy().into_owned(),
            ..Default::default()
        };
    };
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let binary_hash = hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>();
    ccelerate_shared::CommandSpec {
        name,
        local_compiler_path: resolved.to_string_lossy().into_owned(),
        binary_hash,
        size: bytes.len() as u64,
        ..Default::default()
    }
}

pub fn wrap_command(binary: ccelerate_shared::WrappedBinary) {
    let args = std::env::args_os().skip(1).collect::<Vec<_>>();
    let Ok(client) = reqwest::blocking::Client::builder().timeout(None).build() else {
        eprintln!("Failed to build reqwest client");
        exit(1);
    };
    let Ok(cwd) = std::env::current_dir() else {
        eprintln!("Failed to get current directory");
        exit(1);
    };

    let requester = ccelerate_shared::RequesterInfo::current(cwd.to_string_lossy());
    let request = ccelerate_shared::RunRequestData {
        binary,
        args,
        cwd,
        requester,
        command_spec: command_spec(binary),
    };
    let response = client
        .post(format!(
            "http://127.0.0.1:{}/run",
            ccelerate_shared::DEFAULT_PORT
        ))
        .json(&request.to_wire())
        .send();
    match response {
        Ok(response) => {
            if !response.status().is_success() {
                eprintln!(
                    "Failed to run command (status: {}): {}",
                    response.status(),
                    response.text().unwrap_or("Unknown error".to_string()),
                );
                exit(1);
            }
            let Ok(data) = response.json::<ccelerate_shared::RunResponseDataWire>() else {
                eprintln!("Failed to decode response");
                exit(1);
            };
            let Ok(data) = ccelerate_shared::RunResponseData::from_wire(data) else {
                eprintln!("Failed to decode response");
                exit(1);
            };
            std::io::stdout().write_all(&data.stdout).ok();
            std::io::stderr().write_all(&data.stderr).ok();
            exit(data.status);
        }
        Err(err) => {
            if err.is_connect() {
                eprintln!(
                    "Cannot connect to ccelerate_server on port {}, is it running?",
                    ccelerate_shared::DEFAULT_PORT
                );
            } else if err.is_timeout() {
                eprintln!("Connection to ccelerate_server timed out");
            } else {
                eprintln!("Failed: {}", err);
            }
            exit(1);
        }
    }
}
