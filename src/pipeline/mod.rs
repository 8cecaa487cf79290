//! The ingest pipeline: one linear run over a directory of GAR XML files.
//!
//! Every step commits before the next begins, and the step order is part of
//! the contract: the hierarchy index is complete before any staging, address
//! objects are staged and linked before houses, houses before parameters,
//! and address composition runs last.

mod linker;
mod params;
mod reconcile;
mod stager;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::IngestError;
use crate::hierarchy::HierarchyIndex;
use crate::models::HouseParamField;
use crate::postgres::PgStore;
use crate::stats::RunStats;
use crate::xml;

/// Cooperative stop flag, checked at batch boundaries. The in-flight batch
/// commits before the run returns [`IngestError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), IngestError> {
        if self.is_cancelled() {
            Err(IngestError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// The discovered file groups of one region snapshot.
#[derive(Debug)]
pub struct SourceFiles {
    pub addr_objects: Vec<PathBuf>,
    pub mun_hierarchy: Vec<PathBuf>,
    pub adm_hierarchy: Vec<PathBuf>,
    pub houses: Vec<PathBuf>,
    pub house_params: Vec<PathBuf>,
    pub steads: Vec<PathBuf>,
}

impl SourceFiles {
    /// Discover all file groups. Only `AS_ADDR_OBJ` is required; an empty
    /// houses/plots/params group just leaves that section of the output
    /// empty.
    pub fn discover(config: &Config) -> Result<Self, IngestError> {
        let root = &config.xml_directory;
        let region = config.region_code.as_deref();

        let addr_objects = xml::find_files(root, "AS_ADDR_OBJ", region);
        if addr_objects.is_empty() {
            return Err(IngestError::source(
                root.clone(),
                "no AS_ADDR_OBJ files found",
            ));
        }

        // AS_HOUSES also matches the parameter files; keep them separate.
        let houses: Vec<PathBuf> = xml::find_files(root, "AS_HOUSES", region)
            .into_iter()
            .filter(|p| {
                !p.file_name()
                    .map(|n| n.to_string_lossy().to_uppercase().contains("PARAMS"))
                    .unwrap_or(false)
            })
            .collect();

        let files = Self {
            addr_objects,
            mun_hierarchy: xml::find_files(root, "AS_MUN_HIERARCHY", region),
            adm_hierarchy: xml::find_files(root, "AS_ADM_HIERARCHY", region),
            houses,
            house_params: xml::find_files(root, "AS_HOUSES_PARAMS", region),
            steads: xml::find_files(root, "AS_STEADS", region),
        };

        for (group, list) in [
            ("AS_HOUSES", &files.houses),
            ("AS_HOUSES_PARAMS", &files.house_params),
            ("AS_STEADS", &files.steads),
        ] {
            if list.is_empty() {
                warn!("No {} files found; section will be empty", group);
            }
        }

        Ok(files)
    }
}

/// Record-drop counters accumulated across phases.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub skipped_objects: u64,
    pub data_errors: u64,
}

/// Run the full rebuild for one region and return the run summary.
pub async fn run(config: &Config, stop: &CancelFlag) -> Result<RunStats, IngestError> {
    let mut store = PgStore::connect(config).await?;
    store.init_schema().await?;

    let files = SourceFiles::discover(config)?;
    let index = HierarchyIndex::load(
        &files.addr_objects,
        &files.mun_hierarchy,
        &files.adm_hierarchy,
    )?;
    info!(
        "Hierarchy index ready: {} levels, {} edges",
        index.level_count(),
        index.edge_count()
    );
    stop.check()?;

    let mut counters = Counters::default();

    stager::stage_addr_objects(&mut store, &files.addr_objects, config, stop, &mut counters)
        .await?;
    linker::build_addr_links(&mut store, &index, config, stop).await?;

    stager::stage_houses(&mut store, &files.houses, config, stop, &mut counters).await?;
    linker::link_houses(&mut store, &index, config, stop).await?;
    reconcile::repair_house_municipalities(&mut store, &index, config, stop).await?;

    params::apply_house_params(&mut store, &files.house_params, stop, &mut counters).await?;

    stager::stage_land_plots(&mut store, &files.steads, config, stop, &mut counters).await?;
    linker::link_land_plots(&mut store, &index, config, stop).await?;
    reconcile::repair_plot_municipalities(&mut store).await?;

    stop.check()?;
    match store.compose_full_addresses().await {
        Ok(composed) => info!("Composed full addresses for {} houses", composed),
        Err(e) => error!("Address composition failed: {}", e),
    }

    collect_stats(&mut store, counters).await
}

async fn collect_stats(store: &mut PgStore, counters: Counters) -> Result<RunStats, IngestError> {
    let link_counts = store.house_link_counts().await?;
    Ok(RunStats {
        municipalities: store.table_count("municipalities").await?,
        settlements: store.table_count("settlements").await?,
        streets: store.table_count("streets").await?,
        houses: link_counts.total,
        land_plots: store.table_count("land_plots").await?,
        houses_with_street: link_counts.with_street,
        houses_with_settlement: link_counts.with_settlement,
        houses_with_municipality: link_counts.with_municipality,
        cadastral_numbers: store
            .house_param_count(HouseParamField::CadastralNumber)
            .await?,
        residents_counts: store
            .house_param_count(HouseParamField::ResidentsCount)
            .await?,
        floors_counts: store.house_param_count(HouseParamField::FloorsCount).await?,
        skipped_objects: counters.skipped_objects,
        data_errors: counters.data_errors,
    })
}
