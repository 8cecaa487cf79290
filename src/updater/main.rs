//! GAR updater: polls the FIAS version service, downloads and extracts the
//! latest archive, rotates backups, runs the ingest pipeline, and records
//! the installed version token on success.
//!
//! The token lives in `current_version.txt` under the XML directory; the
//! ingest core never reads it.

mod api;
mod archive;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use gar_ingest::pipeline::{self, CancelFlag};
use gar_ingest::Config;

use crate::api::{FiasApi, VersionInfo, DEFAULT_API_BASE};

const VERSION_FILE: &str = "current_version.txt";
const DAEMON_INTERVAL: Duration = Duration::from_secs(24 * 3600);

#[derive(Parser, Debug)]
#[command(name = "updater")]
#[command(about = "Check for new GAR releases and rebuild the address graph")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "gar.toml")]
    config: PathBuf,

    /// Re-import even when the installed version matches the latest
    #[arg(long, short)]
    force: bool,

    /// Only report whether an update is available
    #[arg(long, short)]
    check_only: bool,

    /// Keep running and check once a day
    #[arg(long, short)]
    daemon: bool,

    /// Base URL of the FIAS download-file service
    #[arg(long, default_value = DEFAULT_API_BASE)]
    api_base: String,
}

struct Updater {
    config: Config,
    api: FiasApi,
    update_dir: PathBuf,
    backup_dir: PathBuf,
    version_file: PathBuf,
}

impl Updater {
    fn new(config: Config, api_base: &str) -> Result<Self> {
        let base = &config.xml_directory;
        let update_dir = base.join("updates");
        let backup_dir = base.join("backups");
        std::fs::create_dir_all(&update_dir)?;
        std::fs::create_dir_all(&backup_dir)?;

        Ok(Self {
            api: FiasApi::new(api_base)?,
            version_file: base.join(VERSION_FILE),
            update_dir,
            backup_dir,
            config,
        })
    }

    fn current_version(&self) -> Option<String> {
        std::fs::read_to_string(&self.version_file)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn save_version(&self, version: &str) -> Result<()> {
        std::fs::write(&self.version_file, version)
            .with_context(|| format!("writing {}", self.version_file.display()))
    }

    /// Pick the archive for this install: full when nothing is installed,
    /// delta otherwise. Either way the core rebuilds the region from
    /// scratch.
    fn select_archive<'a>(
        &self,
        info: &'a VersionInfo,
        current: Option<&str>,
    ) -> Result<(&'a str, String)> {
        let (url, prefix) = match current {
            None => (info.full_url.as_deref(), "gar_full"),
            Some(_) => (info.delta_url.as_deref(), "gar_delta"),
        };
        let url = url.context("version service response carries no download URL")?;
        Ok((url, format!("{prefix}_{}.zip", info.version())))
    }

    async fn check_only(&self) -> Result<bool> {
        let info = self.api.last_version().await?;
        let current = self.current_version();
        info!(
            "Installed version: {}",
            current.as_deref().unwrap_or("none")
        );
        info!("Latest version:    {}", info.version());

        let up_to_date = current.as_deref() == Some(info.version().as_str());
        if up_to_date {
            info!("Up to date");
        } else {
            info!("Update available");
        }
        Ok(up_to_date)
    }

    async fn check_and_update(&self, force: bool, stop: &CancelFlag) -> Result<()> {
        let info = self.api.last_version().await?;
        let current = self.current_version();
        info!(
            "Installed version: {}",
            current.as_deref().unwrap_or("none")
        );
        info!("Latest version:    {}", info.version());

        if !force && current.as_deref() == Some(info.version().as_str()) {
            info!("Up to date; nothing to do");
            archive::cleanup(&self.update_dir, &self.backup_dir);
            return Ok(());
        }

        let (url, filename) = self.select_archive(&info, current.as_deref())?;
        let archive_path = archive::download(url, &self.update_dir, &filename).await?;
        let extracted = archive::extract(&archive_path, &self.update_dir)?;

        archive::backup(&self.config.xml_directory, &self.backup_dir, &self.version_file)?;
        archive::apply(&extracted, &self.config.xml_directory)?;

        info!("Running the ingest pipeline...");
        let stats = pipeline::run(&self.config, stop)
            .await
            .context("ingest run failed")?;
        info!("Ingest complete");
        println!("{stats}");

        self.save_version(&info.version())?;
        info!("Recorded version {}", info.version());

        archive::cleanup(&self.update_dir, &self.backup_dir);
        Ok(())
    }

    async fn run_daemon(&self, stop: &CancelFlag) -> Result<()> {
        info!("Running in daemon mode; checking once a day");
        let mut interval = tokio::time::interval(DAEMON_INTERVAL);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.check_and_update(false, stop).await {
                        error!("Update attempt failed: {:#}", e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    warn!("Stop requested; daemon shutting down");
                    stop.cancel();
                    return Ok(());
                }
            }
            if stop.is_cancelled() {
                return Ok(());
            }
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load_from_file(path).with_context(|| format!("loading config from {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let updater = Updater::new(config, &cli.api_base)?;

    let stop = CancelFlag::new();

    if cli.check_only {
        let up_to_date = updater.check_only().await?;
        if !up_to_date {
            std::process::exit(1);
        }
        return Ok(());
    }

    if cli.daemon {
        return updater.run_daemon(&stop).await;
    }

    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Stop requested; finishing the current batch...");
                stop.cancel();
            }
        });
    }
    updater.check_and_update(cli.force, &stop).await
}
