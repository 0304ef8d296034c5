#![deny(clippy::unwrap_used)]

use std::{path::PathBuf, sync::Arc};

use parking_lot::Mutex;

use crate::{
    Cli,
    blob_store::{BlobStore, LocalDirBlobBackend},
    compiler_info_cache::CompilerInfoCache,
    config::Config,
    deps_cache::DepsCache,
    file_stat::FileStatCache,
    linker_fifo::LinkerFifo,
    output_cache::OutputCache,
    parallel_pool::ParallelPool,
    state_persistent::PersistentState,
    task_periods::TaskPeriods,
};

pub struct State {
    pub address: String,
    pub cli: Cli,
    pub data_dir: PathBuf,
    pub persistent: PersistentState,
    pub config: Mutex<Config>,
    pub task_periods: TaskPeriods,
    pub tasks_table_state: Arc<Mutex<ratatui::widgets::TableState>>,
    pub auto_scroll: Arc<Mutex<bool>>,
    pub pool: ParallelPool,
    pub linker_fifo: LinkerFifo,
    pub file_stats: Arc<FileStatCache>,
    pub header_type_cache: Mutex<std::collections::HashMap<PathBuf, bool>>,
    pub compiler_info_cache: CompilerInfoCache,
    pub deps_cache: DepsCache,
    pub output_cache: OutputCache,
    pub blob_store: BlobStore<LocalDirBlobBackend>,
}

impl State {
    pub async fn new(cli: Cli, address: String, data_dir: PathBuf) -> anyhow::Result<Self> {
        let persistent = PersistentState::new(&data_dir.join("state.sqlite3")).await?;
        let conn = persistent.conn.clone();
        let file_stats = FileStatCache::new();
        let blob_backend = Arc::new(LocalDirBlobBackend::new(data_dir.join("blobs")));
        Ok(Self {
            address,
            pool: ParallelPool::new(cli.jobs),
            cli,
            data_dir,
            compiler_info_cache: CompilerInfoCache::new(conn.clone(), file_stats.clone()),
            deps_cache: DepsCache::new(conn.clone()),
            output_cache: OutputCache::new(conn),
            persistent,
            config: Mutex::new(Config::default()),
            task_periods: TaskPeriods::new(),
            tasks_table_state: Arc::new(Mutex::new(ratatui::widgets::TableState::new())),
            auto_scroll: Arc::new(Mutex::new(true)),
            linker_fifo: LinkerFifo::new(),
            file_stats,
            header_type_cache: Mutex::new(std::collections::HashMap::new()),
            blob_store: BlobStore::new(blob_backend),
        })
    }
}
