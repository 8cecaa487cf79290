//! Staged record types for the five entity tables.

mod addr_object;
mod house;
mod plot;

pub use addr_object::{AddrObject, ObjectKind};
pub use house::{House, HouseParamField, ParamValue};
pub use plot::LandPlot;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::IngestError;
use crate::xml::AttrMap;

/// True when a record carries both active flags. Inactive records never
/// reach staging or the hierarchy index.
pub fn is_active_record(attrs: &AttrMap) -> bool {
    attrs.get("ISACTUAL").map(String::as_str) == Some("1")
        && attrs.get("ISACTIVE").map(String::as_str) == Some("1")
}

pub(crate) fn require_i64(attrs: &AttrMap, key: &str) -> Result<i64, IngestError> {
    let raw = attrs
        .get(key)
        .ok_or_else(|| IngestError::Data(format!("missing attribute {key}")))?;
    raw.parse::<i64>()
        .map_err(|_| IngestError::Data(format!("attribute {key}={raw:?} is not an integer")))
}

pub(crate) fn opt_string(attrs: &AttrMap, key: &str) -> Option<String> {
    attrs.get(key).filter(|v| !v.is_empty()).cloned()
}

pub(crate) fn opt_guid(attrs: &AttrMap, key: &str) -> Option<Uuid> {
    attrs.get(key).and_then(|v| Uuid::parse_str(v).ok())
}

pub(crate) fn opt_date(attrs: &AttrMap, key: &str) -> Option<NaiveDate> {
    attrs
        .get(key)
        .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
}
