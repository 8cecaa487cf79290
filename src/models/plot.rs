//! Land plot records from `AS_STEADS`.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::IngestError;
use crate::xml::AttrMap;

use super::{opt_date, opt_guid, opt_string, require_i64};

/// One active `STEAD` record. Plots carry no level; their settlement and
/// municipality links come from the parent resolver.
#[derive(Debug, Clone)]
pub struct LandPlot {
    pub id: i64,
    pub object_id: i64,
    pub object_guid: Option<Uuid>,
    pub plot_number: Option<String>,
    pub is_actual: i32,
    pub is_active: i32,
    pub update_date: Option<NaiveDate>,
}

impl LandPlot {
    pub fn from_attrs(attrs: &AttrMap) -> Result<Self, IngestError> {
        Ok(Self {
            id: require_i64(attrs, "ID")?,
            object_id: require_i64(attrs, "OBJECTID")?,
            object_guid: opt_guid(attrs, "OBJECTGUID"),
            plot_number: opt_string(attrs, "NUMBER"),
            is_actual: 1,
            is_active: 1,
            update_date: opt_date(attrs, "UPDATEDATE"),
        })
    }
}
