//! Streaming stagers: route records into batched inserts.
//!
//! Parent columns stay NULL here; the linker fills them afterwards. A failed
//! batch rolls back, is logged, and the scan continues with the next batch.
//! Broken houses/steads files are logged and skipped (their section of the
//! output stays empty); broken address-object files abort the run.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::IngestError;
use crate::models::{is_active_record, AddrObject, House, LandPlot, ObjectKind};
use crate::postgres::PgStore;
use crate::xml::ElementStream;

use super::{CancelFlag, Counters};

const PROGRESS_EVERY: u64 = 25_000;

/// Propagate fatal errors, swallow a bad file.
fn skip_bad_file(result: Result<u64, IngestError>, total: &mut u64) -> Result<(), IngestError> {
    match result {
        Ok(count) => {
            *total += count;
            Ok(())
        }
        Err(e @ IngestError::Source { .. }) => {
            error!("Skipping unreadable file: {}", e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

pub(crate) async fn stage_addr_objects(
    store: &mut PgStore,
    files: &[PathBuf],
    config: &Config,
    stop: &CancelFlag,
    counters: &mut Counters,
) -> Result<(), IngestError> {
    let mut staged = [0u64; 3]; // municipalities, settlements, streets

    for path in files {
        info!("Staging address objects from {}", path.display());

        let mut municipalities: Vec<AddrObject> = Vec::with_capacity(config.batch_size);
        let mut settlements: Vec<AddrObject> = Vec::with_capacity(config.batch_size);
        let mut streets: Vec<AddrObject> = Vec::with_capacity(config.batch_size);
        let mut processed = 0u64;

        let mut stream = ElementStream::open(path, "OBJECT")?;
        while let Some(attrs) = stream.next_element()? {
            processed += 1;
            if processed % PROGRESS_EVERY == 0 {
                info!("  processed {} objects", processed);
            }

            if !is_active_record(&attrs) {
                continue;
            }

            let object = match AddrObject::from_attrs(&attrs) {
                Ok(object) => object,
                Err(e) => {
                    counters.data_errors += 1;
                    warn!("Dropping OBJECT record: {}", e);
                    continue;
                }
            };

            match object.kind() {
                Some(ObjectKind::Municipality) => municipalities.push(object),
                Some(ObjectKind::Settlement) => settlements.push(object),
                Some(ObjectKind::Street) => streets.push(object),
                None => {
                    counters.skipped_objects += 1;
                    continue;
                }
            }

            if municipalities.len() >= config.batch_size {
                staged[0] +=
                    flush_addr_objects(store, ObjectKind::Municipality, &mut municipalities).await;
                stop.check()?;
            }
            if settlements.len() >= config.batch_size {
                staged[1] +=
                    flush_addr_objects(store, ObjectKind::Settlement, &mut settlements).await;
                stop.check()?;
            }
            if streets.len() >= config.batch_size {
                staged[2] += flush_addr_objects(store, ObjectKind::Street, &mut streets).await;
                stop.check()?;
            }
        }

        staged[0] += flush_addr_objects(store, ObjectKind::Municipality, &mut municipalities).await;
        staged[1] += flush_addr_objects(store, ObjectKind::Settlement, &mut settlements).await;
        staged[2] += flush_addr_objects(store, ObjectKind::Street, &mut streets).await;
        stop.check()?;
    }

    info!(
        "Staged {} municipalities, {} settlements, {} streets ({} other levels skipped)",
        staged[0], staged[1], staged[2], counters.skipped_objects
    );
    Ok(())
}

async fn flush_addr_objects(
    store: &mut PgStore,
    kind: ObjectKind,
    batch: &mut Vec<AddrObject>,
) -> u64 {
    if batch.is_empty() {
        return 0;
    }
    let count = match store.insert_addr_objects(kind, batch).await {
        Ok(inserted) => inserted,
        Err(e) => {
            error!("Failed to insert a {} batch: {}", kind.table(), e);
            0
        }
    };
    batch.clear();
    count
}

pub(crate) async fn stage_houses(
    store: &mut PgStore,
    files: &[PathBuf],
    config: &Config,
    stop: &CancelFlag,
    counters: &mut Counters,
) -> Result<(), IngestError> {
    let mut total = 0u64;
    for path in files {
        info!("Staging houses from {}", path.display());
        let result = stage_houses_file(store, path, config, stop, counters).await;
        skip_bad_file(result, &mut total)?;
    }
    info!("Staged {} houses", total);
    Ok(())
}

async fn stage_houses_file(
    store: &mut PgStore,
    path: &Path,
    config: &Config,
    stop: &CancelFlag,
    counters: &mut Counters,
) -> Result<u64, IngestError> {
    let mut staged = 0u64;
    let mut batch: Vec<House> = Vec::with_capacity(config.batch_size);
    let mut processed = 0u64;

    let mut stream = ElementStream::open(path, "HOUSE")?;
    while let Some(attrs) = stream.next_element()? {
        processed += 1;
        if processed % PROGRESS_EVERY == 0 {
            info!("  processed {} houses", processed);
        }

        if !is_active_record(&attrs) {
            continue;
        }
        match House::from_attrs(&attrs) {
            Ok(house) => batch.push(house),
            Err(e) => {
                counters.data_errors += 1;
                warn!("Dropping HOUSE record: {}", e);
            }
        }

        if batch.len() >= config.batch_size {
            staged += flush_houses(store, &mut batch).await;
            stop.check()?;
        }
    }

    staged += flush_houses(store, &mut batch).await;
    stop.check()?;
    Ok(staged)
}

async fn flush_houses(store: &mut PgStore, batch: &mut Vec<House>) -> u64 {
    if batch.is_empty() {
        return 0;
    }
    let count = match store.insert_houses(batch).await {
        Ok(inserted) => inserted,
        Err(e) => {
            error!("Failed to insert a houses batch: {}", e);
            0
        }
    };
    batch.clear();
    count
}

pub(crate) async fn stage_land_plots(
    store: &mut PgStore,
    files: &[PathBuf],
    config: &Config,
    stop: &CancelFlag,
    counters: &mut Counters,
) -> Result<(), IngestError> {
    let mut total = 0u64;
    for path in files {
        info!("Staging land plots from {}", path.display());
        let result = stage_plots_file(store, path, config, stop, counters).await;
        skip_bad_file(result, &mut total)?;
    }
    info!("Staged {} land plots", total);
    Ok(())
}

async fn stage_plots_file(
    store: &mut PgStore,
    path: &Path,
    config: &Config,
    stop: &CancelFlag,
    counters: &mut Counters,
) -> Result<u64, IngestError> {
    let mut staged = 0u64;
    let mut batch: Vec<LandPlot> = Vec::with_capacity(config.batch_size);
    let mut processed = 0u64;

    let mut stream = ElementStream::open(path, "STEAD")?;
    while let Some(attrs) = stream.next_element()? {
        processed += 1;
        if processed % PROGRESS_EVERY == 0 {
            info!("  processed {} plots", processed);
        }

        if !is_active_record(&attrs) {
            continue;
        }
        match LandPlot::from_attrs(&attrs) {
            Ok(plot) => batch.push(plot),
            Err(e) => {
                counters.data_errors += 1;
                warn!("Dropping STEAD record: {}", e);
            }
        }

        if batch.len() >= config.batch_size {
            staged += flush_plots(store, &mut batch).await;
            stop.check()?;
        }
    }

    staged += flush_plots(store, &mut batch).await;
    stop.check()?;
    Ok(staged)
}

async fn flush_plots(store: &mut PgStore, batch: &mut Vec<LandPlot>) -> u64 {
    if batch.is_empty() {
        return 0;
    }
    let count = match store.insert_land_plots(batch).await {
        Ok(inserted) => inserted,
        Err(e) => {
            error!("Failed to insert a land_plots batch: {}", e);
            0
        }
    };
    batch.clear();
    count
}
