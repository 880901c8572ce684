//! Raw and normalized record types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{EtlError, EtlResult};

/// Prefix marking multi-country rollups (continents, income groups, World).
pub const AGGREGATE_PREFIX: &str = "OWID_";

/// One day of source data: field name to raw JSON value.
pub type RawDailyPoint = serde_json::Map<String, serde_json::Value>;

/// The whole source payload, keyed by region code.
///
/// Records stay undecoded until they are processed so that one malformed
/// entry only costs that country.
pub type Dataset = BTreeMap<String, serde_json::Value>;

/// A single country's (or aggregate's) time series as published upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCountryRecord {
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub data: Vec<RawDailyPoint>,
}

impl RawCountryRecord {
    pub fn new(location: impl Into<String>, data: Vec<RawDailyPoint>) -> Self {
        Self {
            location: Some(location.into()),
            data,
        }
    }

    /// Decode the record stored under region `code`.
    pub fn from_value(code: &str, value: &serde_json::Value) -> EtlResult<Self> {
        Self::deserialize(value).map_err(|e| EtlError::transform(code, format!("malformed record: {}", e)))
    }

    /// Display name, or `Unknown` if the record carries none.
    pub fn name(&self) -> &str {
        self.location.as_deref().unwrap_or("Unknown")
    }
}

/// The `location` of an undecoded record, if it has a string one.
pub fn location_of(value: &serde_json::Value) -> Option<&str> {
    value.get("location").and_then(serde_json::Value::as_str)
}

/// Whether a region code denotes an aggregate rollup.
pub fn is_aggregate(code: &str) -> bool {
    code.starts_with(AGGREGATE_PREFIX)
}

/// Maps source fields onto one target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMap {
    /// Target table name.
    pub table: &'static str,
    /// Source field holding the date, renamed to `report_date`.
    pub date_field: &'static str,
    /// `(source field, target column)` for every metric, in column order.
    pub metrics: &'static [(&'static str, &'static str)],
}

impl FieldMap {
    /// Target metric column names in declaration order.
    pub fn metric_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.metrics.iter().map(|(_, target)| *target)
    }

    /// Every target column, keys first.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut cols = vec!["report_date", "country_name"];
        cols.extend(self.metric_columns());
        cols
    }
}

/// `daily_cases` layout.
pub const CASES: FieldMap = FieldMap {
    table: "daily_cases",
    date_field: "date",
    metrics: &[
        ("total_cases", "total_cases"),
        ("new_cases", "new_cases"),
        ("total_deaths", "total_deaths"),
        ("new_deaths", "new_deaths"),
    ],
};

/// `vaccination_data` layout.
pub const VACCINATIONS: FieldMap = FieldMap {
    table: "vaccination_data",
    date_field: "date",
    metrics: &[
        ("total_vaccinations", "total_vaccinations"),
        ("people_vaccinated", "people_vaccinated"),
        ("people_fully_vaccinated", "people_fully_vaccinated"),
    ],
};

/// A transformed row matching one table's column set exactly.
///
/// `metrics` follows the order of the producing [`FieldMap`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedRow {
    pub report_date: NaiveDate,
    pub country_name: String,
    pub metrics: Vec<(&'static str, i64)>,
}

impl NormalizedRow {
    /// Value of a metric column, if this row carries it.
    pub fn metric(&self, column: &str) -> Option<i64> {
        self.metrics
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, v)| *v)
    }

    /// The deduplication key.
    pub fn key(&self) -> (NaiveDate, &str) {
        (self.report_date, self.country_name.as_str())
    }

    /// Whether the metric columns line up with `map`.
    pub fn matches(&self, map: &FieldMap) -> bool {
        self.metrics.len() == map.metrics.len()
            && self
                .metrics
                .iter()
                .zip(map.metric_columns())
                .all(|((name, _), col)| *name == col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_codes() {
        assert!(is_aggregate("OWID_WRL"));
        assert!(is_aggregate("OWID_EUR"));
        assert!(!is_aggregate("ITA"));
        assert!(!is_aggregate("owid_wrl"));
    }

    #[test]
    fn test_columns_order() {
        assert_eq!(
            CASES.columns(),
            vec![
                "report_date",
                "country_name",
                "total_cases",
                "new_cases",
                "total_deaths",
                "new_deaths"
            ]
        );
        assert_eq!(VACCINATIONS.columns().len(), 5);
    }

    #[test]
    fn test_row_matches_map() {
        let row = NormalizedRow {
            report_date: NaiveDate::from_ymd_opt(2021, 5, 1).unwrap(),
            country_name: "Italy".to_string(),
            metrics: vec![
                ("total_vaccinations", 10),
                ("people_vaccinated", 8),
                ("people_fully_vaccinated", 2),
            ],
        };
        assert!(row.matches(&VACCINATIONS));
        assert!(!row.matches(&CASES));
        assert_eq!(row.metric("people_vaccinated"), Some(8));
        assert_eq!(row.metric("new_cases"), None);
    }

    #[test]
    fn test_record_deserializes_sparse() {
        let rec: RawCountryRecord = serde_json::from_str(r#"{"continent": "Europe"}"#).unwrap();
        assert_eq!(rec.name(), "Unknown");
        assert!(rec.data.is_empty());
    }

    #[test]
    fn test_malformed_record_is_transform_error() {
        let bad = [
            serde_json::json!({"location": "Peru", "data": null}),
            serde_json::json!({"location": "Peru", "data": [1]}),
            serde_json::json!("Peru"),
        ];
        for value in &bad {
            let err = RawCountryRecord::from_value("PER", value).unwrap_err();
            assert!(matches!(err, EtlError::Transform { ref country, .. } if country == "PER"));
        }
        assert_eq!(location_of(&bad[0]), Some("Peru"));
        assert_eq!(location_of(&bad[2]), None);

        let ok = serde_json::json!({"location": "Italy", "data": [{"date": "2021-05-01"}]});
        let rec = RawCountryRecord::from_value("ITA", &ok).unwrap();
        assert_eq!(rec.name(), "Italy");
        assert_eq!(rec.data.len(), 1);
    }
}
