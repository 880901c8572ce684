//! Command surface and dispatcher.

use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tracing::error;

use crate::error::EtlError;
use crate::model::Dataset;
use crate::pipeline::{self, DataType, DateWindow, LoadOptions};
use crate::report::{self, OutputFormat, RankMetric, Table, TrendMetric};
use crate::source::SourceClient;
use crate::store::{SqlValue, Store};

#[derive(Debug, Parser)]
#[command(name = "epi-etl")]
#[command(version)]
#[command(about = "Healthcare data ETL: fetch, load and query epidemiological time series", long_about = None)]
#[command(after_help = "EXAMPLES:
    epi-etl init_db
    epi-etl fetch_data --country all --data_type cases
    epi-etl fetch_data --country Italy --start_date 2021-01-01 --end_date 2021-06-30
    epi-etl query_data top_countries 10 total_deaths")]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, env = "EPI_ETL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format for query results
    #[arg(short, long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
#[command(rename_all = "snake_case")]
pub enum Command {
    /// Fetch the dataset and load it into the database
    FetchData {
        /// Country name, or "all" for every country
        #[arg(long)]
        country: String,

        /// First date to load (YYYY-MM-DD)
        #[arg(long = "start_date")]
        start_date: Option<NaiveDate>,

        /// Last date to load (YYYY-MM-DD)
        #[arg(long = "end_date")]
        end_date: Option<NaiveDate>,

        /// Which tables to populate
        #[arg(long = "data_type", value_enum, default_value = "all")]
        data_type: DataType,
    },
    /// Query the database
    QueryData {
        #[command(subcommand)]
        query: Option<QueryCommand>,
    },
    /// List all tables
    ListTables,
    /// Drop all tables
    DropTables,
    /// Create the tables from the DDL script
    InitDb,
}

#[derive(Debug, Subcommand)]
#[command(rename_all = "snake_case")]
pub enum QueryCommand {
    /// Total cases for a country
    TotalCases {
        /// Country name
        country: String,
    },
    /// Daily values of a metric for a country
    DailyTrends {
        /// Country name
        country: String,
        #[arg(value_enum)]
        metric: TrendMetric,
    },
    /// Top N countries by a metric
    TopCountries {
        /// Number of countries
        n: u32,
        #[arg(value_enum)]
        metric: RankMetric,
    },
}

/// Help text for the whole CLI, or for one sub-command.
pub fn usage(subcommand: Option<&str>) -> String {
    let mut cmd = Cli::command();
    if let Some(sub) = subcommand.and_then(|name| cmd.find_subcommand_mut(name)) {
        return sub.render_help().to_string();
    }
    cmd.render_help().to_string()
}

/// Output for commands that are answered without touching config, the
/// database or the network, such as `query_data` with no query type.
pub fn offline_output(command: &Command) -> Option<String> {
    match command {
        Command::QueryData { query: None } => {
            let err = EtlError::Usage("missing query type for query_data command".to_string());
            Some(format!("Error: {}\n\n{}", err, usage(Some("query_data"))))
        }
        _ => None,
    }
}

/// Drives one command against the gateways.
pub struct App {
    store: Store,
    source: SourceClient,
    schema_path: PathBuf,
    format: OutputFormat,
}

impl App {
    pub fn new(store: Store, source: SourceClient, schema_path: PathBuf, format: OutputFormat) -> Self {
        Self {
            store,
            source,
            schema_path,
            format,
        }
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    /// Run one command and return what should be printed.
    pub async fn execute(&mut self, command: Command) -> String {
        if let Some(output) = offline_output(&command) {
            return output;
        }
        match command {
            Command::FetchData {
                country,
                start_date,
                end_date,
                data_type,
            } => {
                let window = match DateWindow::new(start_date, end_date) {
                    Ok(w) => w,
                    Err(e) => {
                        error!("{}", e);
                        return format!("{}\n\n{}", e, usage(Some("fetch_data")));
                    }
                };
                let dataset = self.source.fetch().await;
                self.load(&dataset, &country, &LoadOptions { data_type, window }).await
            }
            Command::QueryData { query: None } => usage(Some("query_data")),
            Command::QueryData { query: Some(query) } => self.query(query).await,
            Command::ListTables => self.list_tables().await,
            Command::DropTables => {
                if self.store.drop_tables().await {
                    "All tables dropped successfully".green().to_string()
                } else {
                    "Failed to drop tables".red().to_string()
                }
            }
            Command::InitDb => {
                if self.store.create_schema(&self.schema_path).await {
                    "Database tables created successfully".green().to_string()
                } else {
                    "Failed to create tables".red().to_string()
                }
            }
        }
    }

    /// Load an already fetched dataset for one country or `all`.
    pub async fn load(&mut self, dataset: &Dataset, country: &str, options: &LoadOptions) -> String {
        if dataset.is_empty() {
            error!("Failed to fetch data from API");
            return "Failed to fetch data from API".red().to_string();
        }

        if country.eq_ignore_ascii_case("all") {
            let summary = pipeline::load_all(&mut self.store, dataset, options).await;
            return format!(
                "Processed {} countries, skipped {}",
                summary.processed, summary.skipped
            );
        }

        match pipeline::load_country(&mut self.store, dataset, country, options).await {
            Ok(report) => {
                let parts: Vec<String> = report
                    .inserted
                    .iter()
                    .map(|(table, n)| format!("{} into {}", n, table))
                    .collect();
                format!("Inserted {} for {}", parts.join(", "), report.country)
            }
            Err(e) => {
                error!("{}", e);
                e.to_string()
            }
        }
    }

    async fn query(&mut self, query: QueryCommand) -> String {
        match query {
            QueryCommand::TotalCases { country } => {
                match report::total_cases(&mut self.store, &country).await {
                    Some(total) if self.format == OutputFormat::Json => {
                        serde_json::json!({ "country": country, "total_cases": total }).to_string()
                    }
                    Some(total) => format!("\nTotal cases in {}: {}", country, report::group_thousands(total)),
                    None => format!("\nNo case data found for {}", country),
                }
            }
            QueryCommand::DailyTrends { country, metric } => {
                let table = report::daily_trends(&mut self.store, &country, metric).await;
                let title = format!("Daily {} in {}:", metric.column().replace('_', " "), country);
                self.titled(&title, &table, &format!("No trend data found for {}", country))
            }
            QueryCommand::TopCountries { n, metric } => {
                let table = report::top_countries(&mut self.store, n, metric).await;
                let title = format!("Top {} countries by {}:", n, metric.column().replace('_', " "));
                self.titled(&title, &table, "No country data found")
            }
        }
    }

    async fn list_tables(&mut self) -> String {
        let tables = self.store.list_tables().await;
        let table = Table::new(
            &["Table Name"],
            tables.into_iter().map(|t| vec![SqlValue::Text(t)]).collect(),
        );
        self.titled("Database Tables:", &table, "No tables found in database")
    }

    fn titled(&self, title: &str, table: &Table, empty: &str) -> String {
        if table.is_empty() {
            return format!("\n{}", empty);
        }
        match self.format {
            OutputFormat::Json => report::render(table, OutputFormat::Json),
            OutputFormat::Table => format!(
                "\n{}\n{}",
                title.green().bold(),
                report::render(table, OutputFormat::Table)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch_data() {
        let cli = Cli::try_parse_from([
            "epi-etl",
            "fetch_data",
            "--country",
            "all",
            "--start_date",
            "2021-01-01",
            "--data_type",
            "vaccinations",
        ])
        .unwrap();
        match cli.command {
            Some(Command::FetchData {
                country,
                start_date,
                end_date,
                data_type,
            }) => {
                assert_eq!(country, "all");
                assert_eq!(start_date, NaiveDate::from_ymd_opt(2021, 1, 1));
                assert_eq!(end_date, None);
                assert_eq!(data_type, DataType::Vaccinations);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_fetch_requires_country() {
        assert!(Cli::try_parse_from(["epi-etl", "fetch_data"]).is_err());
        assert!(Cli::try_parse_from(["epi-etl", "fetch_data", "--country", "x", "--data_type", "deaths"]).is_err());
    }

    #[test]
    fn test_parse_queries() {
        let cli = Cli::try_parse_from(["epi-etl", "query_data", "top_countries", "3", "total_cases"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::QueryData {
                query: Some(QueryCommand::TopCountries {
                    n: 3,
                    metric: RankMetric::TotalCases
                })
            })
        ));

        let cli = Cli::try_parse_from(["epi-etl", "query_data", "daily_trends", "Italy", "new_deaths"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::QueryData {
                query: Some(QueryCommand::DailyTrends {
                    metric: TrendMetric::NewDeaths,
                    ..
                })
            })
        ));
    }

    #[test]
    fn test_metric_choices_are_closed() {
        assert!(Cli::try_parse_from(["epi-etl", "query_data", "daily_trends", "Italy", "total_cases"]).is_err());
        assert!(
            Cli::try_parse_from(["epi-etl", "query_data", "top_countries", "3", "new_cases; DROP TABLE x"]).is_err()
        );
    }

    #[test]
    fn test_missing_commands_parse() {
        let cli = Cli::try_parse_from(["epi-etl"]).unwrap();
        assert!(cli.command.is_none());
        let cli = Cli::try_parse_from(["epi-etl", "query_data"]).unwrap();
        assert!(matches!(cli.command, Some(Command::QueryData { query: None })));
    }

    #[test]
    fn test_missing_query_type_answered_offline() {
        let cli = Cli::try_parse_from(["epi-etl", "query_data"]).unwrap();
        let out = offline_output(&cli.command.unwrap()).unwrap();
        assert!(out.starts_with("Error: Usage error: missing query type"));
        assert!(out.contains("top_countries"));

        let cli = Cli::try_parse_from(["epi-etl", "query_data", "total_cases", "Italy"]).unwrap();
        assert!(offline_output(&cli.command.unwrap()).is_none());
        let cli = Cli::try_parse_from(["epi-etl", "list_tables"]).unwrap();
        assert!(offline_output(&cli.command.unwrap()).is_none());
    }

    #[test]
    fn test_usage_for_subcommand() {
        assert!(usage(None).contains("fetch_data"));
        assert!(usage(Some("query_data")).contains("top_countries"));
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }
}
