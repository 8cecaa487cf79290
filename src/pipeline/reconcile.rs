//! Reconciliation: repair leaves the primary resolver left unlinked.
//!
//! The municipal hierarchy is incomplete at the leaf for some regions:
//! houses attach to streets but never directly to a municipal edge, while
//! the street reaches a municipality through its settlement. Set-based fills
//! recover those, and a bounded direct lookup sweeps the residue.

use tracing::{error, info};

use crate::config::Config;
use crate::error::IngestError;
use crate::hierarchy::HierarchyIndex;
use crate::postgres::PgStore;

use super::linker::resolve_mo;
use super::CancelFlag;

/// Houses still missing a municipality per residual pass, to keep
/// transactions reasonable.
const RESIDUAL_LIMIT: i64 = 50_000;

pub(crate) async fn repair_house_municipalities(
    store: &mut PgStore,
    index: &HierarchyIndex,
    config: &Config,
    stop: &CancelFlag,
) -> Result<(), IngestError> {
    // 1. Through-street fill.
    stop.check()?;
    match store.fill_house_municipality_via_street().await {
        Ok(updated) => info!("Through-street fill updated {} houses", updated),
        Err(e) => error!("Through-street fill failed: {}", e),
    }

    // 2. Through-settlement fill.
    stop.check()?;
    match store.fill_house_municipality_via_settlement().await {
        Ok(updated) => info!("Through-settlement fill updated {} houses", updated),
        Err(e) => error!("Through-settlement fill failed: {}", e),
    }

    // 3. Residual direct lookup over whatever is still unlinked.
    stop.check()?;
    let remaining = store.house_ids_missing_municipality(RESIDUAL_LIMIT).await?;
    if remaining.is_empty() {
        return Ok(());
    }
    info!(
        "Residual direct lookup over {} houses without a municipality",
        remaining.len()
    );

    let mut pairs: Vec<(i64, i64)> = Vec::with_capacity(config.update_batch_size);
    let mut updated = 0u64;
    for object_id in &remaining {
        if let Some(mo_id) = resolve_mo(index, *object_id) {
            pairs.push((mo_id, *object_id));
        }
        if pairs.len() >= config.update_batch_size {
            updated += flush(store, &mut pairs).await;
            stop.check()?;
        }
    }
    updated += flush(store, &mut pairs).await;

    info!("Residual direct lookup updated {} houses", updated);
    Ok(())
}

/// Land plots get the same through-settlement repair once they are linked.
pub(crate) async fn repair_plot_municipalities(store: &mut PgStore) -> Result<(), IngestError> {
    match store.fill_plot_municipality_via_settlement().await {
        Ok(updated) => info!("Through-settlement fill updated {} land plots", updated),
        Err(e) => error!("Through-settlement fill for plots failed: {}", e),
    }
    Ok(())
}

async fn flush(store: &mut PgStore, pairs: &mut Vec<(i64, i64)>) -> u64 {
    if pairs.is_empty() {
        return 0;
    }
    let count = match store
        .update_parent_column("houses", "municipality_id", pairs)
        .await
    {
        Ok(updated) => updated,
        Err(e) => {
            error!("Failed to update a residual municipality batch: {}", e);
            0
        }
    };
    pairs.clear();
    count
}
