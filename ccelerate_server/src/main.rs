#![deny(clippy::unwrap_used)]

mod args_processing;
mod blob_store;
mod code_language;
mod coff_rewrite;
mod command;
mod compile_route;
mod compile_task;
mod compiler_info;
mod compiler_info_cache;
mod compiler_mismatch;
mod compute_cache;
mod config;
mod content_hash;
mod deps_cache;
mod export_trace;
mod file_stat;
mod include_resolver;
mod interner;
mod linker_fifo;
mod local_code;
mod output_cache;
mod parallel_pool;
mod parse_ar;
mod parse_gcc;
mod path_utils;
mod preprocessor_directives;
mod source_file;
mod state;
mod state_persistent;
mod task_log;
mod task_periods;
mod tui;

pub use state::State;

use std::path::PathBuf;

use actix_web::web::Data;
use anyhow::Result;
use ccelerate_shared::{RunRequestData, RunResponseData};
use clap::Parser;

/// Distributed compile coordinator. Wrapped `gcc`/`g++`/`clang`/`clang++`/`ar`
/// invocations are forwarded here over HTTP by `ccelerate_wrappers`.
#[derive(Parser, Debug, Clone)]
#[command(name = "ccelerate_server")]
pub struct Cli {
    /// Number of compiles to run in parallel.
    #[arg(long, default_value_t = num_cpus())]
    pub jobs: usize,

    /// Directory used for the sqlite state file and the blob store.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Address to bind the HTTP server to.
    #[arg(long, default_value_t = format!("127.0.0.1:{}", ccelerate_shared::DEFAULT_PORT))]
    pub address: String,

    /// Disable the interactive terminal dashboard.
    #[arg(long)]
    pub no_tui: bool,
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[actix_web::get("/")]
async fn route_index(state: Data<State>) -> impl actix_web::Responder {
    format!("ccelerate_server at http://{}", state.address)
}

#[actix_web::post("/run")]
async fn route_run(
    state: Data<State>,
    run_request: actix_web::web::Json<ccelerate_shared::RunRequestDataWire>,
) -> impl actix_web::Responder {
    let started = std::time::Instant::now();
    let request = match RunRequestData::from_wire(&run_request) {
        Ok(request) => request,
        Err(err) => {
            return actix_web::HttpResponse::BadRequest().body(format!("bad request: {err}"));
        }
    };
    let result = compile_route::run(request, &state.into_inner()).await;
    let response = match result {
        Ok(response) => response,
        Err(err) => {
            log::error!("compiler_proxy [{:?}]: {err:#}", started.elapsed());
            RunResponseData {
                stdout: Vec::new(),
                stderr: format!("compiler_proxy [{:?}]: {err:#}", started.elapsed()).into_bytes(),
                status: 1,
                ..Default::default()
            }
        }
    };
    actix_web::HttpResponse::Ok().json(response.to_wire())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(default_data_dir);
    let address = cli.address.clone();
    let run_tui = !cli.no_tui;

    let state = Data::new(State::new(cli, address.clone(), data_dir).await?);

    log::info!("Listening on http://{address}");
    let server = actix_web::HttpServer::new({
        let state = state.clone();
        move || {
            actix_web::App::new()
                .app_data(state.clone())
                .service(route_index)
                .service(route_run)
        }
    })
    .bind(&address)?
    .run();

    if run_tui {
        let tui_state = state.clone();
        tokio::select! {
            result = server => result?,
            result = tui::run_tui(&tui_state) => result?,
        }
    } else {
        server.await?;
    }
    Ok(())
}

fn default_data_dir() -> PathBuf {
    dirs_data_dir().join("ccelerate_server")
}

fn dirs_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CCELERATE_DATA_DIR") {
        return PathBuf::from(dir);
    }
    std::env::temp_dir()
}
