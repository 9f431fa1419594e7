//! camara-ingest - Legislative open-data ingestion CLI
//!
//! Runs the full ingestion pipeline for one legislative year against the
//! Chamber of Deputies open-data service, printing the progress stream to
//! stdout. The resulting per-year SQLite store is what the read-side query
//! API serves from.

use anyhow::Result;
use camara_common::config::DataPaths;
use camara_common::events::{ProgressBus, ProgressEvent};
use camara_ingest::IngestPipeline;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "camara-ingest", about = "Ingest Chamber of Deputies open data for one year")]
struct Args {
    /// Legislative year to ingest (2011-2027)
    #[arg(long)]
    year: i32,

    /// Bulk-file cache directory (default: data/, env: CAMARA_CACHE_DIR)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Database directory (default: dbs/, env: CAMARA_DB_DIR)
    #[arg(long)]
    db_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    info!("Starting camara-ingest");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut paths = DataPaths::resolve();
    if let Some(cache_dir) = args.cache_dir {
        paths.cache_dir = cache_dir;
    }
    if let Some(db_dir) = args.db_dir {
        paths.db_dir = db_dir;
    }

    let bus = ProgressBus::new(100);
    let mut rx = bus.subscribe();
    let printer = tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match rx.recv().await {
                Ok(ProgressEvent::Log { message, .. }) => println!("{}", message),
                Ok(ProgressEvent::Progress { percent, .. }) => println!("[{:>3}%]", percent),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let pipeline = IngestPipeline::new(paths);
    let success = pipeline.run(args.year, &bus).await;

    // Closing the bus ends the printer task
    drop(bus);
    let _ = printer.await;

    if !success {
        std::process::exit(1);
    }

    Ok(())
}
