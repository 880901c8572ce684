//! Fetch-transform-load driver.

use chrono::NaiveDate;
use clap::ValueEnum;
use tracing::{error, info, warn};

use crate::error::{EtlError, EtlResult};
use crate::model::{CASES, Dataset, FieldMap, NormalizedRow, RawCountryRecord, VACCINATIONS, is_aggregate, location_of};
use crate::store::Store;
use crate::transform::transform;

/// Which tables a fetch populates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DataType {
    Cases,
    Vaccinations,
    #[default]
    All,
}

impl DataType {
    pub fn field_maps(self) -> &'static [FieldMap] {
        static ALL: [FieldMap; 2] = [CASES, VACCINATIONS];
        match self {
            Self::Cases => &ALL[..1],
            Self::Vaccinations => &ALL[1..],
            Self::All => &ALL,
        }
    }
}

/// Inclusive date range; an open end matches everything on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> EtlResult<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(EtlError::Usage(format!("start date {} is after end date {}", s, e)));
            }
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }

    fn apply(&self, rows: Vec<NormalizedRow>) -> Vec<NormalizedRow> {
        if self.start.is_none() && self.end.is_none() {
            return rows;
        }
        rows.into_iter().filter(|r| self.contains(r.report_date)).collect()
    }
}

/// What to load for each country.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    pub data_type: DataType,
    pub window: DateWindow,
}

/// Rows inserted per table for one country.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryReport {
    pub country: String,
    pub inserted: Vec<(&'static str, usize)>,
}

impl CountryReport {
    pub fn total(&self) -> usize {
        self.inserted.iter().map(|(_, n)| n).sum()
    }
}

/// Tally of an all-countries run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub processed: usize,
    pub skipped: usize,
}

/// Transform and insert one country's data for every selected table.
///
/// Each table is written in its own transaction; the first failing table
/// aborts the rest of this country.
pub async fn process_country(
    store: &mut Store,
    record: &RawCountryRecord,
    options: &LoadOptions,
) -> EtlResult<CountryReport> {
    let name = record.name();
    let mut report = CountryReport {
        country: name.to_string(),
        inserted: Vec::new(),
    };

    for map in options.data_type.field_maps() {
        let rows = options.window.apply(transform(&record.data, map, name));
        if rows.is_empty() {
            warn!(country = name, table = map.table, "no data for country");
            report.inserted.push((map.table, 0));
            continue;
        }
        let result = store.try_insert(map, &rows).await?;
        info!(country = name, table = map.table, inserted = result.inserted, "loaded");
        report.inserted.push((map.table, result.inserted));
    }
    Ok(report)
}

/// Load every non-aggregate country in the dataset.
///
/// Aggregates, malformed records and countries whose load fails count as
/// skipped; the run carries on past them.
pub async fn load_all(store: &mut Store, dataset: &Dataset, options: &LoadOptions) -> FetchSummary {
    let total = dataset.len();
    let mut summary = FetchSummary::default();

    for (code, value) in dataset {
        if is_aggregate(code) {
            summary.skipped += 1;
            continue;
        }
        let name = location_of(value).unwrap_or(code.as_str());
        info!("Processing {} ({}/{})", name, summary.processed + 1, total);

        let outcome = match RawCountryRecord::from_value(code, value) {
            Ok(record) if record.location.is_some() => process_country(store, &record, options).await,
            Ok(_) => Err(EtlError::transform(code.as_str(), "record has no location")),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(_) => summary.processed += 1,
            Err(e) => {
                error!("Failed to process {}: {}", name, e);
                summary.skipped += 1;
            }
        }
    }

    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        "finished loading all countries"
    );
    summary
}

/// Load the country whose display name matches `country` exactly.
pub async fn load_country(
    store: &mut Store,
    dataset: &Dataset,
    country: &str,
    options: &LoadOptions,
) -> EtlResult<CountryReport> {
    let (code, value) = dataset
        .iter()
        .find(|(_, v)| location_of(v) == Some(country))
        .ok_or_else(|| EtlError::NotFound(country.to_string()))?;
    let record = RawCountryRecord::from_value(code, value)?;
    process_country(store, &record, options).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_data_type_maps() {
        assert_eq!(DataType::Cases.field_maps(), &[CASES]);
        assert_eq!(DataType::Vaccinations.field_maps(), &[VACCINATIONS]);
        assert_eq!(DataType::All.field_maps().len(), 2);
    }

    #[test]
    fn test_window_bounds_inclusive() {
        let w = DateWindow::new(Some(date(2021, 1, 1)), Some(date(2021, 1, 31))).unwrap();
        assert!(w.contains(date(2021, 1, 1)));
        assert!(w.contains(date(2021, 1, 31)));
        assert!(!w.contains(date(2020, 12, 31)));
        assert!(!w.contains(date(2021, 2, 1)));

        let open = DateWindow::default();
        assert!(open.contains(date(1999, 1, 1)));
    }

    #[test]
    fn test_window_rejects_inverted_range() {
        let err = DateWindow::new(Some(date(2021, 2, 1)), Some(date(2021, 1, 1))).unwrap_err();
        assert!(matches!(err, EtlError::Usage(_)));
    }
}
