//! Read-side queries and result rendering.
//!
//! Metric columns reach SQL only through the closed enums below, so no user
//! input is ever interpolated into a statement.

use clap::ValueEnum;
use colored::*;
use std::fmt;

use crate::store::{SqlValue, Store};

/// Metrics available to `daily_trends`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum TrendMetric {
    NewCases,
    NewDeaths,
}

/// Metrics available to `top_countries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum RankMetric {
    TotalCases,
    TotalDeaths,
}

impl TrendMetric {
    pub fn column(self) -> &'static str {
        match self {
            Self::NewCases => "new_cases",
            Self::NewDeaths => "new_deaths",
        }
    }
}

impl RankMetric {
    pub fn column(self) -> &'static str {
        match self {
            Self::TotalCases => "total_cases",
            Self::TotalDeaths => "total_deaths",
        }
    }
}

impl fmt::Display for TrendMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl fmt::Display for RankMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Column headers plus rows, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl Table {
    pub fn new(headers: &[&str], rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Output format for result tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Sum of daily new cases for a country, or `None` if it has no rows.
pub async fn total_cases(store: &mut Store, country: &str) -> Option<i64> {
    let rows = store
        .query(
            "SELECT COUNT(*), CAST(COALESCE(SUM(new_cases), 0) AS SIGNED) \
             FROM daily_cases WHERE country_name = ?",
            &[SqlValue::from(country)],
        )
        .await;
    let row = rows.first()?;
    match (row.first().and_then(SqlValue::as_i64), row.get(1).and_then(SqlValue::as_i64)) {
        (Some(count), Some(total)) if count > 0 => Some(total),
        _ => None,
    }
}

/// One metric per day for a country, oldest first.
pub async fn daily_trends(store: &mut Store, country: &str, metric: TrendMetric) -> Table {
    let sql = format!(
        "SELECT CAST(report_date AS CHAR), {col} FROM daily_cases \
         WHERE country_name = ? ORDER BY report_date",
        col = metric.column()
    );
    let rows = store.query(&sql, &[SqlValue::from(country)]).await;
    Table::new(&["Date", title_case(metric.column()).as_str()], rows)
}

/// The `n` countries with the highest peak value of `metric`.
pub async fn top_countries(store: &mut Store, n: u32, metric: RankMetric) -> Table {
    let sql = format!(
        "SELECT country_name, MAX({col}) AS total FROM daily_cases \
         GROUP BY country_name ORDER BY total DESC LIMIT ?",
        col = metric.column()
    );
    let rows = store.query(&sql, &[SqlValue::Int(i64::from(n))]).await;
    Table::new(&["Country", "Total"], rows)
}

/// `new_cases` -> `New Cases`.
pub fn title_case(column: &str) -> String {
    column
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `1234567` -> `1,234,567`.
pub fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if n < 0 {
        out.insert(0, '-');
    }
    out
}

/// Render a table in the requested format.
pub fn render(table: &Table, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => render_json(table),
        OutputFormat::Table => render_table(table),
    }
}

fn render_json(table: &Table) -> String {
    let records: Vec<serde_json::Value> = table
        .rows
        .iter()
        .map(|row| {
            let map = table
                .headers
                .iter()
                .zip(row)
                .map(|(h, v)| (h.clone(), v.to_json()))
                .collect::<serde_json::Map<_, _>>();
            serde_json::Value::Object(map)
        })
        .collect();
    serde_json::to_string_pretty(&records).unwrap_or_default()
}

fn render_table(table: &Table) -> String {
    if table.is_empty() {
        return "(no results)".dimmed().to_string();
    }

    let cells: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| row.iter().map(|v| v.to_string()).collect())
        .collect();

    // Calculate column widths
    let mut widths: Vec<usize> = table.headers.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let mut out = Vec::with_capacity(cells.len() + 4);

    let header: Vec<String> = table
        .headers
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("{:width$}", h, width = *w))
        .collect();
    out.push(header.join(" │ ").white().bold().to_string());

    let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    out.push(sep.join("─┼─").dimmed().to_string());

    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:width$}", c, width = *w))
            .collect();
        out.push(line.join(" │ "));
    }

    out.push(String::new());
    out.push(format!("{} row(s) returned", cells.len().to_string().cyan()));
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("new_cases"), "New Cases");
        assert_eq!(title_case("people_fully_vaccinated"), "People Fully Vaccinated");
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
        assert_eq!(group_thousands(-45000), "-45,000");
    }

    #[test]
    fn test_render_table() {
        colored::control::set_override(false);
        let table = Table::new(
            &["Country", "Total"],
            vec![
                vec![SqlValue::from("Italy"), SqlValue::Int(500)],
                vec![SqlValue::from("Peru"), SqlValue::Int(30)],
            ],
        );
        let out = render(&table, OutputFormat::Table);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Country │ Total");
        assert_eq!(lines[2], "Italy   │ 500  ");
        assert_eq!(lines[3], "Peru    │ 30   ");
        assert_eq!(lines[5], "2 row(s) returned");
    }

    #[test]
    fn test_render_json() {
        let table = Table::new(&["Date", "New Cases"], vec![vec![SqlValue::from("2021-05-01"), SqlValue::Int(7)]]);
        let value: serde_json::Value = serde_json::from_str(&render(&table, OutputFormat::Json)).unwrap();
        assert_eq!(value, serde_json::json!([{"Date": "2021-05-01", "New Cases": 7}]));
    }

    #[test]
    fn test_metric_columns() {
        assert_eq!(TrendMetric::NewDeaths.column(), "new_deaths");
        assert_eq!(RankMetric::TotalCases.to_string(), "total_cases");
        assert!(TrendMetric::from_str("new_cases", false).is_ok());
        assert!(RankMetric::from_str("new_cases", false).is_err());
    }
}
