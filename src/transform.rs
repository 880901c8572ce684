//! Record transformer.
//!
//! Turns one country's sparse daily points into [`NormalizedRow`]s for a
//! target table. Undated rows are dropped; metrics are always present and
//! default to zero.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{CASES, FieldMap, NormalizedRow, RawCountryRecord, RawDailyPoint, VACCINATIONS};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Transform raw points into rows shaped by `map`.
pub fn transform(points: &[RawDailyPoint], map: &FieldMap, country_name: &str) -> Vec<NormalizedRow> {
    if points.is_empty() {
        warn!(country = country_name, table = map.table, "no source data");
        return Vec::new();
    }

    let rows: Vec<NormalizedRow> = points
        .iter()
        .filter_map(|point| transform_point(point, map, country_name))
        .collect();

    let dropped = points.len() - rows.len();
    if dropped > 0 {
        debug!(country = country_name, table = map.table, dropped, "dropped undated rows");
    }
    rows
}

/// Case rows for a country record.
pub fn transform_cases(record: &RawCountryRecord) -> Vec<NormalizedRow> {
    transform(&record.data, &CASES, record.name())
}

/// Vaccination rows for a country record.
pub fn transform_vaccinations(record: &RawCountryRecord) -> Vec<NormalizedRow> {
    transform(&record.data, &VACCINATIONS, record.name())
}

fn transform_point(point: &RawDailyPoint, map: &FieldMap, country_name: &str) -> Option<NormalizedRow> {
    let report_date = point.get(map.date_field).and_then(parse_date)?;

    let metrics = map
        .metrics
        .iter()
        .map(|(source, target)| (*target, point.get(*source).map(coerce_int).unwrap_or(0)))
        .collect();

    Some(NormalizedRow {
        report_date,
        country_name: country_name.to_string(),
        metrics,
    })
}

/// Parse a date value. Only strings are accepted; any time part is discarded.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    let s = value.as_str()?.trim();

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Coerce a metric value to an integer, falling back to 0.
pub fn coerce_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(truncate))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate))
                .unwrap_or(0)
        }
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

fn truncate(f: f64) -> Option<i64> {
    // `as` saturates, so reject anything outside i64 before casting
    if f.is_finite() && f.abs() < 9.2e18 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}
