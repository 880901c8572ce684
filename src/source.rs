//! Remote source gateway.
//!
//! Fetches the whole dataset in one request. Failures are logged and turn
//! into an empty [`Dataset`], which callers treat as "nothing to process".

use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use std::time::Duration;
use tracing::{error, info};

use crate::config::ApiConfig;
use crate::error::{EtlError, EtlResult};
use crate::model::Dataset;

/// HTTP client for the upstream dataset.
#[derive(Debug, Clone)]
pub struct SourceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl SourceClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> EtlResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn from_config(config: &ApiConfig) -> EtlResult<Self> {
        Self::new(
            config.base_url.clone(),
            config.token().map(str::to_string),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Fetch the dataset, or an empty map on any failure.
    pub async fn fetch(&self) -> Dataset {
        match self.try_fetch().await {
            Ok(dataset) => {
                info!(regions = dataset.len(), "fetched dataset");
                dataset
            }
            Err(e) => {
                error!(url = %self.base_url, "{}", e);
                Dataset::new()
            }
        }
    }

    /// Fetch the dataset, surfacing transport, status and decoding errors.
    pub async fn try_fetch(&self) -> EtlResult<Dataset> {
        let mut request = self.client.get(&self.base_url);
        if let Some(key) = &self.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {}", key));
        }
        let body = request.send().await?.error_for_status()?.text().await?;
        parse_dataset(&body)
    }
}

/// Decode a payload mapping region code to country record.
///
/// Only the top-level shape is checked here; each record is decoded when it
/// is processed.
pub fn parse_dataset(body: &str) -> EtlResult<Dataset> {
    serde_json::from_str(body).map_err(|e| EtlError::Fetch(format!("invalid payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RawCountryRecord, location_of};

    #[test]
    fn test_parse_dataset() {
        let body = r#"{
            "ITA": {"continent": "Europe", "location": "Italy", "data": [
                {"date": "2021-05-01", "new_cases": 100}
            ]},
            "OWID_WRL": {"location": "World", "data": []}
        }"#;
        let dataset = parse_dataset(body).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(location_of(&dataset["ITA"]), Some("Italy"));
        assert_eq!(dataset["ITA"]["data"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_parse_keeps_good_records_beside_bad_ones() {
        let body = r#"{
            "ITA": {"location": "Italy", "data": [{"date": "2021-05-01"}]},
            "PER": {"location": "Peru", "data": null},
            "XKX": "Kosovo"
        }"#;
        let dataset = parse_dataset(body).unwrap();
        assert_eq!(dataset.len(), 3);
        assert!(RawCountryRecord::from_value("ITA", &dataset["ITA"]).is_ok());
        assert!(RawCountryRecord::from_value("PER", &dataset["PER"]).is_err());
    }

    #[test]
    fn test_parse_rejects_non_mapping() {
        assert!(matches!(parse_dataset("[1, 2, 3]"), Err(EtlError::Fetch(_))));
        assert!(matches!(parse_dataset("<html>"), Err(EtlError::Fetch(_))));
    }

    #[test]
    fn test_blank_key_dropped() {
        let client = SourceClient::new("http://localhost/x", Some("  ".into()), Duration::from_secs(1)).unwrap();
        assert!(client.api_key.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_source_yields_empty() {
        // port 9 (discard) is closed on test hosts
        let client = SourceClient::new("http://127.0.0.1:9/data.json", None, Duration::from_secs(2)).unwrap();
        assert!(client.fetch().await.is_empty());
        assert!(matches!(client.try_fetch().await, Err(EtlError::Fetch(_))));
    }
}
