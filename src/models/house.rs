//! House records from `AS_HOUSES` and their parameter stream.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::IngestError;
use crate::xml::AttrMap;

use super::{opt_date, opt_guid, opt_string, require_i64};

/// One active `HOUSE` record. Parent links and parameters are filled by
/// later pipeline steps.
#[derive(Debug, Clone)]
pub struct House {
    pub id: i64,
    pub object_id: i64,
    pub object_guid: Option<Uuid>,
    pub house_number: Option<String>,
    pub building_number: Option<String>,
    pub structure_number: Option<String>,
    pub is_actual: i32,
    pub is_active: i32,
    pub update_date: Option<NaiveDate>,
}

impl House {
    pub fn from_attrs(attrs: &AttrMap) -> Result<Self, IngestError> {
        Ok(Self {
            id: require_i64(attrs, "ID")?,
            object_id: require_i64(attrs, "OBJECTID")?,
            object_guid: opt_guid(attrs, "OBJECTGUID"),
            house_number: opt_string(attrs, "HOUSENUM"),
            building_number: opt_string(attrs, "ADDNUM1"),
            structure_number: opt_string(attrs, "ADDNUM2"),
            is_actual: 1,
            is_active: 1,
            update_date: opt_date(attrs, "UPDATEDATE"),
        })
    }
}

/// A validated house parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Count(i32),
}

/// The three recognized `PARAM` type codes. Everything else in the stream is
/// ignored without counting as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HouseParamField {
    CadastralNumber,
    ResidentsCount,
    FloorsCount,
}

impl HouseParamField {
    pub fn from_type_id(type_id: &str) -> Option<Self> {
        match type_id {
            "8" => Some(HouseParamField::CadastralNumber),
            "14" => Some(HouseParamField::ResidentsCount),
            "15" => Some(HouseParamField::FloorsCount),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            HouseParamField::CadastralNumber => "cadastral_number",
            HouseParamField::ResidentsCount => "residents_count",
            HouseParamField::FloorsCount => "floors_count",
        }
    }

    /// Validate a raw attribute value against the field's domain. `None`
    /// means the record is dropped and counted as a data error.
    pub fn validate(&self, raw: &str) -> Option<ParamValue> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        match self {
            HouseParamField::CadastralNumber => {
                if !trimmed.contains(':') {
                    return None;
                }
                let truncated: String = trimmed.chars().take(100).collect();
                Some(ParamValue::Text(truncated))
            }
            HouseParamField::ResidentsCount | HouseParamField::FloorsCount => {
                // Values arrive as "5" or "5.0"; parse through float like the
                // upstream data expects, then truncate.
                let parsed = trimmed.parse::<f64>().ok()?;
                if !parsed.is_finite() {
                    return None;
                }
                let count = parsed.trunc() as i64;
                if (0..=1000).contains(&count) {
                    Some(ParamValue::Count(count as i32))
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_only_the_three_type_codes() {
        assert_eq!(
            HouseParamField::from_type_id("8"),
            Some(HouseParamField::CadastralNumber)
        );
        assert_eq!(
            HouseParamField::from_type_id("14"),
            Some(HouseParamField::ResidentsCount)
        );
        assert_eq!(
            HouseParamField::from_type_id("15"),
            Some(HouseParamField::FloorsCount)
        );
        assert_eq!(HouseParamField::from_type_id("7"), None);
        assert_eq!(HouseParamField::from_type_id(""), None);
    }

    #[test]
    fn cadastral_number_requires_a_colon() {
        let field = HouseParamField::CadastralNumber;
        assert_eq!(
            field.validate(" 01:05:0200178:19 "),
            Some(ParamValue::Text("01:05:0200178:19".into()))
        );
        assert_eq!(field.validate("0105020017819"), None);
        assert_eq!(field.validate("   "), None);
    }

    #[test]
    fn cadastral_number_is_truncated_to_100_chars() {
        let long = format!("01:{}", "9".repeat(200));
        match HouseParamField::CadastralNumber.validate(&long) {
            Some(ParamValue::Text(v)) => assert_eq!(v.chars().count(), 100),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn counts_accept_zero_to_one_thousand() {
        let field = HouseParamField::ResidentsCount;
        assert_eq!(field.validate("0"), Some(ParamValue::Count(0)));
        assert_eq!(field.validate("1000"), Some(ParamValue::Count(1000)));
        assert_eq!(field.validate("5.0"), Some(ParamValue::Count(5)));
        assert_eq!(field.validate("10000"), None);
        assert_eq!(field.validate("-1"), None);
        assert_eq!(field.validate("abc"), None);
        assert_eq!(field.validate("inf"), None);
    }
}
