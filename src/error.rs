//! Error types for epi-etl.

use thiserror::Error;

/// The main error type for ETL operations.
///
/// Most variants never escape the component that raised them: the gateways
/// log the error and hand back an empty, zero or `false` result instead.
#[derive(Debug, Error)]
pub enum EtlError {
    /// The remote dataset could not be fetched or decoded.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// A country's records could not be transformed.
    #[error("Transform failed for {country}: {message}")]
    Transform { country: String, message: String },

    /// A database statement failed and its transaction was rolled back.
    #[error("Database error: {0}")]
    Persistence(String),

    /// No record matched the requested country.
    #[error("No data found for country: {0}")]
    NotFound(String),

    /// A command was invoked without a required argument or sub-command.
    #[error("Usage error: {0}")]
    Usage(String),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EtlError {
    /// Create a transform error for the given country.
    pub fn transform(country: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transform {
            country: country.into(),
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for EtlError {
    fn from(e: sqlx::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<reqwest::Error> for EtlError {
    fn from(e: reqwest::Error) -> Self {
        Self::Fetch(e.to_string())
    }
}

/// Result type alias for ETL operations.
pub type EtlResult<T> = Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EtlError::transform("Italy", "bad payload");
        assert_eq!(err.to_string(), "Transform failed for Italy: bad payload");
    }

    #[test]
    fn test_not_found_display() {
        let err = EtlError::NotFound("Atlantis".to_string());
        assert_eq!(err.to_string(), "No data found for country: Atlantis");
    }
}
