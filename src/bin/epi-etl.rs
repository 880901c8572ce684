//! epi-etl — the ETL command line
//!
//! # Usage
//!
//! ```bash
//! # Create the tables
//! epi-etl init_db
//!
//! # Load every country
//! epi-etl fetch_data --country all
//!
//! # Query
//! epi-etl query_data total_cases Italy
//! ```

use anyhow::Context;
use clap::Parser;
use colored::*;
use epi_etl::cli::{self, App, Cli};
use epi_etl::config::Config;
use epi_etl::source::SourceClient;
use epi_etl::store::Store;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    let mut cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let Some(command) = cli.command.take() else {
        println!("{}", cli::usage(None));
        return;
    };
    if let Some(output) = cli::offline_output(&command) {
        println!("{}", output);
        return;
    }

    let mut app = match setup(&cli).await {
        Ok(app) => app,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    let output = app.execute(command).await;
    if !output.is_empty() {
        println!("{}", output);
    }
    app.store_mut().close().await;
}

async fn setup(cli: &Cli) -> anyhow::Result<App> {
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let url = config.database.url()?;
    let store = Store::connect(&url)
        .await
        .with_context(|| format!("connecting to database {}", config.database.database))?;
    let source = SourceClient::from_config(&config.api)?;
    Ok(App::new(
        store,
        source,
        config.database.schema_path().to_path_buf(),
        cli.format,
    ))
}
