//! # epi-etl
//!
//! Pulls the Our World in Data COVID-19 dataset, reshapes each country's
//! time series into flat case and vaccination rows, and loads them into
//! MySQL or SQLite without duplicating a `(report_date, country_name)` pair.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use epi_etl::prelude::*;
//!
//! let mut store = Store::connect("sqlite::memory:").await?;
//! store.create_schema(Path::new("sql/create_tables.sql")).await;
//!
//! let dataset = SourceClient::from_config(&config.api)?.fetch().await;
//! let summary = load_all(&mut store, &dataset, &LoadOptions::default()).await;
//! ```
//!
//! ## Pipeline
//!
//! | Stage     | Module      | Failure becomes          |
//! |-----------|-------------|--------------------------|
//! | Fetch     | `source`    | empty dataset            |
//! | Transform | `transform` | dropped row / empty list |
//! | Load      | `store`     | 0 inserted, rolled back  |
//! | Query     | `report`    | "no data found"          |

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod store;
pub mod transform;

pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::*;
    pub use crate::model::*;
    pub use crate::pipeline::{DataType, DateWindow, FetchSummary, LoadOptions, load_all, load_country};
    pub use crate::source::SourceClient;
    pub use crate::store::{InsertReport, SqlValue, Store};
    pub use crate::transform::{transform, transform_cases, transform_vaccinations};
}
