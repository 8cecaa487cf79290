//! House parameter pass: join the `PARAM` stream onto persisted houses.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::error::IngestError;
use crate::models::HouseParamField;
use crate::postgres::PgStore;
use crate::xml::ElementStream;

use super::{CancelFlag, Counters};

const PROGRESS_EVERY: u64 = 100_000;
const STOP_CHECK_EVERY: u64 = 1_000;

pub(crate) async fn apply_house_params(
    store: &mut PgStore,
    files: &[PathBuf],
    stop: &CancelFlag,
    counters: &mut Counters,
) -> Result<(), IngestError> {
    let mut total_updated = 0u64;

    for path in files {
        info!("Applying house parameters from {}", path.display());
        match apply_params_file(store, path, stop, counters).await {
            Ok(updated) => total_updated += updated,
            // A broken params file only costs its own parameters.
            Err(e @ IngestError::Source { .. }) => error!("Skipping unreadable file: {}", e),
            Err(e) => return Err(e),
        }
    }

    info!("Applied {} house parameter updates", total_updated);
    Ok(())
}

async fn apply_params_file(
    store: &mut PgStore,
    path: &Path,
    stop: &CancelFlag,
    counters: &mut Counters,
) -> Result<u64, IngestError> {
    let mut processed = 0u64;
    let mut updated = 0u64;

    let mut stream = ElementStream::open(path, "PARAM")?;
    while let Some(attrs) = stream.next_element()? {
        processed += 1;
        if processed % PROGRESS_EVERY == 0 {
            info!("  processed {} params, updated {}", processed, updated);
        }
        if processed % STOP_CHECK_EVERY == 0 {
            stop.check()?;
        }

        // Unknown type codes are not errors; the stream carries dozens of
        // parameter kinds this schema does not model.
        let field = match attrs
            .get("TYPEID")
            .and_then(|t| HouseParamField::from_type_id(t))
        {
            Some(field) => field,
            None => continue,
        };
        let object_id = match attrs.get("OBJECTID").and_then(|v| v.parse::<i64>().ok()) {
            Some(id) => id,
            None => {
                counters.data_errors += 1;
                continue;
            }
        };
        let raw = match attrs.get("VALUE") {
            Some(value) => value,
            None => {
                counters.data_errors += 1;
                continue;
            }
        };

        let value = match field.validate(raw) {
            Some(value) => value,
            None => {
                counters.data_errors += 1;
                warn!(
                    "Dropping {} value {:?} for house {}",
                    field.column(),
                    raw,
                    object_id
                );
                continue;
            }
        };

        match store.apply_house_param(field, &value, object_id).await {
            Ok(count) => updated += count,
            Err(e) => error!("Failed to apply {} update: {}", field.column(), e),
        }
    }

    info!("  processed {} params, updated {}", processed, updated);
    Ok(updated)
}
