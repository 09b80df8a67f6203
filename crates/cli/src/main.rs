use anyhow::{Context, Result};
use clap::Parser;
use common::Config;
use engine::Engine;
use std::path::PathBuf;

const DEFAULT_DATA_DIR: &str = "./db_data";
const DEFAULT_PAGE_SIZE: usize = 16384;
const DEFAULT_BUFFER_POOL_SIZE: usize = 256;

/// Starts the storage engine against a data directory, running crash
/// recovery, then exits. Does not open a SQL session or speak any wire
/// protocol -- it exists to exercise engine startup/recovery/shutdown.
#[derive(Parser, Debug)]
#[command(name = "cli", about = "InnoDB-style storage engine host")]
struct Args {
    /// Default schema (database) to create on first startup if absent.
    #[arg(long, default_value = "app")]
    schema: String,
    /// Directory holding tablespaces, the WAL, checkpoints, and the catalog.
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,
    /// Number of page frames the buffer pool keeps resident.
    #[arg(long = "innodb-buffer-pool-size", default_value_t = DEFAULT_BUFFER_POOL_SIZE)]
    innodb_buffer_pool_size: usize,
    /// Fixed page size in bytes shared by every tablespace.
    #[arg(long = "innodb-page-size", default_value_t = DEFAULT_PAGE_SIZE)]
    innodb_page_size: usize,
    /// Path (relative to `data_dir`) of the system tablespace's data file.
    #[arg(long = "innodb-data-file-path", default_value = "ibdata1")]
    innodb_data_file_path: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = Config::builder()
        .data_dir(args.data_dir.clone())
        .page_size(args.innodb_page_size)
        .buffer_pool_pages(args.innodb_buffer_pool_size)
        .build();

    tracing::info!(
        data_dir = %args.data_dir.display(),
        schema = %args.schema,
        system_tablespace = %args.innodb_data_file_path,
        "starting engine"
    );

    let engine = Engine::open(config)
        .with_context(|| format!("failed to open database at {}", args.data_dir.display()))?;

    tracing::info!("engine started and recovery complete");

    engine
        .shutdown()
        .context("failed to flush and shut down cleanly")?;

    Ok(())
}
