//! Market data source abstraction
//!
//! The fetcher talks to the provider through `MarketDataSource`, which keeps
//! the HTTP client swappable (Polygon in production, in-memory fakes in tests).

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use super::{EconomicIndicator, StockQuote, TimeSeriesPoint};
use crate::error::ServiceError;

/// Errors that can occur when talking to the market data provider
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP request failed before a response was received
    ///
    /// The request URL is stripped because it carries the API key.
    #[error("HTTP request failed: {0}")]
    RequestFailed(reqwest::Error),

    /// Provider signalled a rate limit (HTTP 429)
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Provider answered with a non-success status
    #[error("API request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Response did not contain the expected data
    #[error("Missing expected field in response: {0}")]
    MissingField(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::RequestFailed(err.without_url())
    }
}

impl From<SourceError> for ServiceError {
    fn from(err: SourceError) -> Self {
        let status_code = match &err {
            SourceError::RateLimited => Some(429),
            SourceError::Status { status, .. } => Some(*status),
            SourceError::RequestFailed(e) => e.status().map(|s| s.as_u16()),
            SourceError::ParseError(_) | SourceError::MissingField(_) => None,
        };
        ServiceError::Upstream {
            status_code,
            message: err.to_string(),
        }
    }
}

/// Raw provider operations used by the upstream fetcher
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Previous trading day's quote for `symbol`
    async fn previous_close(&self, symbol: &str, credential: &str)
        -> Result<StockQuote, SourceError>;

    /// Closing prices for `symbol` between `from` and `to` inclusive
    async fn aggregates(
        &self,
        symbol: &str,
        timespan: &str,
        from: NaiveDate,
        to: NaiveDate,
        credential: &str,
    ) -> Result<Vec<TimeSeriesPoint>, SourceError>;

    /// Latest value of the economic series `name` (e.g. "GDP")
    async fn indicator(&self, name: &str, credential: &str)
        -> Result<EconomicIndicator, SourceError>;
}
