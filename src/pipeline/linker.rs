//! Parent-link building: walk the hierarchy index for every staged row and
//! persist the resolved foreign keys in batched updates.

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use crate::config::Config;
use crate::error::IngestError;
use crate::hierarchy::{HierarchyIndex, SETTLEMENT_LEVELS, STREET_LEVELS};
use crate::postgres::{HouseLinks, PgStore, PlotLinks};

use super::CancelFlag;

fn progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(label.to_string());
    pb
}

/// Links between the staged address-object tables, in dependency order:
/// municipality self-parents, settlements to municipalities, streets to
/// settlements, then streets to municipalities through their settlement.
pub(crate) async fn build_addr_links(
    store: &mut PgStore,
    index: &HierarchyIndex,
    config: &Config,
    stop: &CancelFlag,
) -> Result<(), IngestError> {
    // 1. Municipality parent_id (district nesting). A municipality resolving
    //    to itself is left without a parent.
    let ids = store.object_ids("municipalities").await?;
    let mut pairs = Vec::with_capacity(config.update_batch_size);
    let mut updated = 0u64;
    for object_id in &ids {
        if let Some(parent) = resolve_mo(index, *object_id) {
            if parent != *object_id {
                pairs.push((parent, *object_id));
            }
        }
        if pairs.len() >= config.update_batch_size {
            updated += flush_parent_column(store, "municipalities", "parent_id", &mut pairs).await;
            stop.check()?;
        }
    }
    updated += flush_parent_column(store, "municipalities", "parent_id", &mut pairs).await;
    info!("Linked {} municipalities to parent municipalities", updated);

    // 2. Settlement municipality_id, through the municipal chain.
    let ids = store.object_ids("settlements").await?;
    let mut pairs = Vec::with_capacity(config.update_batch_size);
    let mut updated = 0u64;
    for object_id in &ids {
        if let Some(parent) = resolve_mo(index, *object_id) {
            if parent != *object_id {
                pairs.push((parent, *object_id));
            }
        }
        if pairs.len() >= config.update_batch_size {
            updated +=
                flush_parent_column(store, "settlements", "municipality_id", &mut pairs).await;
            stop.check()?;
        }
    }
    updated += flush_parent_column(store, "settlements", "municipality_id", &mut pairs).await;
    info!("Linked {} settlements to municipalities", updated);

    // 3. Street settlement_id.
    let ids = store.object_ids("streets").await?;
    let mut pairs = Vec::with_capacity(config.update_batch_size);
    let mut updated = 0u64;
    for object_id in &ids {
        if let Some(parent) = resolve_level(index, *object_id, SETTLEMENT_LEVELS) {
            pairs.push((parent, *object_id));
        }
        if pairs.len() >= config.update_batch_size {
            updated += flush_parent_column(store, "streets", "settlement_id", &mut pairs).await;
            stop.check()?;
        }
    }
    updated += flush_parent_column(store, "streets", "settlement_id", &mut pairs).await;
    info!("Linked {} streets to settlements", updated);

    // 4. Street municipality_id, set-based through settlements.
    stop.check()?;
    match store.link_streets_to_municipalities().await {
        Ok(updated) => info!("Linked {} streets to municipalities", updated),
        Err(e) => error!("Street-to-municipality fill failed: {}", e),
    }

    Ok(())
}

/// Resolve street, settlement, and municipality for every staged house.
pub(crate) async fn link_houses(
    store: &mut PgStore,
    index: &HierarchyIndex,
    config: &Config,
    stop: &CancelFlag,
) -> Result<(), IngestError> {
    let ids = store.object_ids("houses").await?;
    info!("Linking {} houses to the hierarchy", ids.len());

    let pb = progress_bar(ids.len() as u64, "houses");
    let mut batch: Vec<HouseLinks> = Vec::with_capacity(config.update_batch_size);
    let mut linked = 0u64;

    for object_id in &ids {
        pb.inc(1);

        let links = HouseLinks {
            object_id: *object_id,
            street_id: resolve_level(index, *object_id, STREET_LEVELS),
            settlement_id: resolve_level(index, *object_id, SETTLEMENT_LEVELS),
            municipality_id: resolve_mo(index, *object_id),
        };
        if links.street_id.is_some()
            || links.settlement_id.is_some()
            || links.municipality_id.is_some()
        {
            batch.push(links);
        }

        if batch.len() >= config.update_batch_size {
            linked += flush_house_links(store, &mut batch).await;
            stop.check()?;
        }
    }
    linked += flush_house_links(store, &mut batch).await;
    pb.finish_and_clear();

    info!("Linked {} of {} houses", linked, ids.len());
    Ok(())
}

/// Resolve settlement and municipality for every staged land plot.
pub(crate) async fn link_land_plots(
    store: &mut PgStore,
    index: &HierarchyIndex,
    config: &Config,
    stop: &CancelFlag,
) -> Result<(), IngestError> {
    let ids = store.object_ids("land_plots").await?;
    if ids.is_empty() {
        return Ok(());
    }
    info!("Linking {} land plots to the hierarchy", ids.len());

    let mut batch: Vec<PlotLinks> = Vec::with_capacity(config.update_batch_size);
    let mut linked = 0u64;

    for object_id in &ids {
        let links = PlotLinks {
            object_id: *object_id,
            settlement_id: resolve_level(index, *object_id, SETTLEMENT_LEVELS),
            municipality_id: resolve_mo(index, *object_id),
        };
        if links.settlement_id.is_some() || links.municipality_id.is_some() {
            batch.push(links);
        }

        if batch.len() >= config.update_batch_size {
            linked += flush_plot_links(store, &mut batch).await;
            stop.check()?;
        }
    }
    linked += flush_plot_links(store, &mut batch).await;

    info!("Linked {} of {} land plots", linked, ids.len());
    Ok(())
}

/// Resolver output is a string id from the source; anything that does not
/// parse as i64 is treated as a miss.
pub(crate) fn resolve_level(
    index: &HierarchyIndex,
    object_id: i64,
    levels: &[&str],
) -> Option<i64> {
    index
        .find_parent_by_level(&object_id.to_string(), levels)
        .and_then(|id| id.parse::<i64>().ok())
}

pub(crate) fn resolve_mo(index: &HierarchyIndex, object_id: i64) -> Option<i64> {
    index
        .find_mo_parent(&object_id.to_string())
        .and_then(|id| id.parse::<i64>().ok())
}

async fn flush_parent_column(
    store: &mut PgStore,
    table: &str,
    column: &str,
    pairs: &mut Vec<(i64, i64)>,
) -> u64 {
    if pairs.is_empty() {
        return 0;
    }
    let count = match store.update_parent_column(table, column, pairs).await {
        Ok(updated) => updated,
        Err(e) => {
            error!("Failed to update {}.{} batch: {}", table, column, e);
            0
        }
    };
    pairs.clear();
    count
}

async fn flush_house_links(store: &mut PgStore, batch: &mut Vec<HouseLinks>) -> u64 {
    if batch.is_empty() {
        return 0;
    }
    let count = match store.update_house_links(batch).await {
        Ok(updated) => updated,
        Err(e) => {
            error!("Failed to update a house-links batch: {}", e);
            0
        }
    };
    batch.clear();
    count
}

async fn flush_plot_links(store: &mut PgStore, batch: &mut Vec<PlotLinks>) -> u64 {
    if batch.is_empty() {
        return 0;
    }
    let count = match store.update_plot_links(batch).await {
        Ok(updated) => updated,
        Err(e) => {
            error!("Failed to update a plot-links batch: {}", e);
            0
        }
    };
    batch.clear();
    count
}
