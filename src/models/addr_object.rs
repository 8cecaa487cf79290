//! Level-tagged address objects from `AS_ADDR_OBJ`.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::IngestError;
use crate::hierarchy::{MUNICIPALITY_LEVELS, SETTLEMENT_LEVELS, STREET_LEVELS};
use crate::xml::AttrMap;

use super::{opt_date, opt_guid, require_i64};

/// Which staging table a level routes to. The source models municipalities,
/// settlements and streets as one polymorphic `OBJECT` discriminated by a
/// `LEVEL` string; everything outside 3..=8 is counted and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Municipality,
    Settlement,
    Street,
}

impl ObjectKind {
    pub fn from_level(level: &str) -> Option<Self> {
        if MUNICIPALITY_LEVELS.contains(&level) {
            Some(ObjectKind::Municipality)
        } else if SETTLEMENT_LEVELS.contains(&level) {
            Some(ObjectKind::Settlement)
        } else if STREET_LEVELS.contains(&level) {
            Some(ObjectKind::Street)
        } else {
            None
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            ObjectKind::Municipality => "municipalities",
            ObjectKind::Settlement => "settlements",
            ObjectKind::Street => "streets",
        }
    }
}

/// One active `OBJECT` record, parsed at the staging boundary.
#[derive(Debug, Clone)]
pub struct AddrObject {
    pub id: i64,
    pub object_id: i64,
    pub object_guid: Option<Uuid>,
    pub name: String,
    pub type_name: String,
    pub level: String,
    pub is_actual: i32,
    pub is_active: i32,
    pub update_date: Option<NaiveDate>,
}

impl AddrObject {
    pub fn from_attrs(attrs: &AttrMap) -> Result<Self, IngestError> {
        Ok(Self {
            id: require_i64(attrs, "ID")?,
            object_id: require_i64(attrs, "OBJECTID")?,
            object_guid: opt_guid(attrs, "OBJECTGUID"),
            name: attrs.get("NAME").cloned().unwrap_or_default(),
            type_name: attrs.get("TYPENAME").cloned().unwrap_or_default(),
            level: attrs.get("LEVEL").cloned().unwrap_or_default(),
            is_actual: 1,
            is_active: 1,
            update_date: opt_date(attrs, "UPDATEDATE"),
        })
    }

    pub fn kind(&self) -> Option<ObjectKind> {
        ObjectKind::from_level(&self.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::AttrMap;

    fn attrs(pairs: &[(&str, &str)]) -> AttrMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn routes_levels_to_staging_tables() {
        assert_eq!(ObjectKind::from_level("3"), Some(ObjectKind::Municipality));
        assert_eq!(ObjectKind::from_level("4"), Some(ObjectKind::Municipality));
        assert_eq!(ObjectKind::from_level("5"), Some(ObjectKind::Settlement));
        assert_eq!(ObjectKind::from_level("6"), Some(ObjectKind::Settlement));
        assert_eq!(ObjectKind::from_level("7"), Some(ObjectKind::Street));
        assert_eq!(ObjectKind::from_level("8"), Some(ObjectKind::Street));
        assert_eq!(ObjectKind::from_level("1"), None);
        assert_eq!(ObjectKind::from_level("2"), None);
        assert_eq!(ObjectKind::from_level(""), None);
    }

    #[test]
    fn parses_a_full_object_record() {
        let object = AddrObject::from_attrs(&attrs(&[
            ("ID", "7"),
            ("OBJECTID", "1226471"),
            ("OBJECTGUID", "5bd5cef9-0f5a-4b4f-a384-a25c4a8e9067"),
            ("NAME", "Майкоп"),
            ("TYPENAME", "г"),
            ("LEVEL", "5"),
            ("UPDATEDATE", "2021-08-12"),
        ]))
        .unwrap();

        assert_eq!(object.object_id, 1226471);
        assert_eq!(object.kind(), Some(ObjectKind::Settlement));
        assert!(object.object_guid.is_some());
        assert_eq!(
            object.update_date,
            chrono::NaiveDate::from_ymd_opt(2021, 8, 12)
        );
    }

    #[test]
    fn malformed_object_id_is_a_data_error() {
        let result = AddrObject::from_attrs(&attrs(&[("ID", "1"), ("OBJECTID", "12x")]));
        assert!(matches!(result, Err(crate::error::IngestError::Data(_))));
    }
}
