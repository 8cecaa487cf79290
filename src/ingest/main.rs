//! GAR ingest pipeline CLI.
//!
//! Rebuilds the address graph for one region from a directory of extracted
//! GAR XML files. Exit code 0 on success, 1 on failure.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gar_ingest::pipeline::{self, CancelFlag};
use gar_ingest::Config;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Ingest GAR XML data for one region into PostgreSQL")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "gar.toml")]
    config: PathBuf,

    /// Override the XML directory from the config
    #[arg(long)]
    xml_dir: Option<PathBuf>,

    /// Override the region code from the config
    #[arg(long)]
    region: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load_from_file(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if let Some(xml_dir) = cli.xml_dir {
        config.xml_directory = xml_dir;
    }
    if let Some(region) = cli.region {
        config.region_code = Some(region);
    }

    info!("GAR Ingest Pipeline");
    info!("Source: {}", config.xml_directory.display());
    if let Some(region) = &config.region_code {
        info!("Region: {}", region);
    }

    let stop = CancelFlag::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Stop requested; finishing the current batch...");
                stop.cancel();
            }
        });
    }

    let stats = pipeline::run(&config, &stop)
        .await
        .context("ingest run failed")?;

    info!("Run complete");
    println!("{stats}");
    Ok(())
}
