//! Polygon.io REST client
//!
//! Fetches previous-close quotes, aggregate bars and reference ticker data
//! from Polygon-style endpoints and maps them into our domain records.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::source::{MarketDataSource, SourceError};
use super::{EconomicIndicator, StockQuote, TimeSeriesPoint};

/// Base URL for the Polygon API
pub const POLYGON_BASE_URL: &str = "https://api.polygon.io";

/// Response of the previous-close and range aggregate endpoints
#[derive(Debug, Deserialize)]
struct AggregatesResponse {
    #[serde(default)]
    results: Vec<AggregateBar>,
}

/// A single OHLC bar
#[derive(Debug, Deserialize)]
struct AggregateBar {
    /// Close price
    c: Option<f64>,
    /// Open price
    o: Option<f64>,
    /// Bar start, unix milliseconds
    t: Option<i64>,
}

/// Response of the reference ticker endpoint
#[derive(Debug, Deserialize)]
struct TickerDetailsResponse {
    results: Option<TickerDetails>,
}

#[derive(Debug, Deserialize)]
struct TickerDetails {
    last_price: Option<f64>,
    last_updated_utc: Option<String>,
}

/// Client for the Polygon market data API
#[derive(Debug, Clone)]
pub struct PolygonClient {
    /// HTTP client for making requests
    http_client: Client,
    /// Base URL for the API (allows override for testing)
    base_url: String,
}

impl Default for PolygonClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PolygonClient {
    /// Creates a client pointing at the public Polygon API
    pub fn new() -> Self {
        Self::with_base_url(POLYGON_BASE_URL)
    }

    /// Creates a client with a custom base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Replaces the underlying HTTP client (timeouts, proxies)
    pub fn with_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issues a GET against `path` and decodes the JSON body
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        credential: &str,
    ) -> Result<T, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(path, "polygon request");

        let response = self
            .http_client
            .get(&url)
            .query(&[("apiKey", credential)])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited);
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl MarketDataSource for PolygonClient {
    async fn previous_close(
        &self,
        symbol: &str,
        credential: &str,
    ) -> Result<StockQuote, SourceError> {
        let path = format!("/v2/aggs/ticker/{}/prev", symbol);
        let response: AggregatesResponse = self.get_json(&path, credential).await?;

        let bar = response
            .results
            .first()
            .ok_or_else(|| SourceError::MissingField(format!("results for {}", symbol)))?;

        Ok(quote_from_bar(symbol, bar))
    }

    async fn aggregates(
        &self,
        symbol: &str,
        timespan: &str,
        from: NaiveDate,
        to: NaiveDate,
        credential: &str,
    ) -> Result<Vec<TimeSeriesPoint>, SourceError> {
        let path = format!(
            "/v2/aggs/ticker/{}/range/1/{}/{}/{}",
            symbol,
            timespan,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );
        let response: AggregatesResponse = self.get_json(&path, credential).await?;

        if response.results.is_empty() {
            return Err(SourceError::MissingField(format!("results for {}", symbol)));
        }

        response
            .results
            .iter()
            .map(|bar| {
                let timestamp = bar
                    .t
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                    .ok_or_else(|| SourceError::MissingField("t".to_string()))?;
                let price = bar.c.ok_or_else(|| SourceError::MissingField("c".to_string()))?;
                Ok(TimeSeriesPoint { timestamp, price })
            })
            .collect()
    }

    async fn indicator(
        &self,
        name: &str,
        credential: &str,
    ) -> Result<EconomicIndicator, SourceError> {
        let path = format!("/v3/reference/tickers/I:{}", name);
        let response: TickerDetailsResponse = self.get_json(&path, credential).await?;

        let details = response
            .results
            .ok_or_else(|| SourceError::MissingField("results".to_string()))?;
        let value = details
            .last_price
            .ok_or_else(|| SourceError::MissingField("last_price".to_string()))?;

        Ok(EconomicIndicator {
            name: name.to_string(),
            value,
            date: details
                .last_updated_utc
                .as_deref()
                .map(date_part)
                .unwrap_or_default(),
        })
    }
}

/// Builds a quote from a previous-close bar, measuring change against the open
fn quote_from_bar(symbol: &str, bar: &AggregateBar) -> StockQuote {
    let close = bar.c.unwrap_or(0.0);
    let open = bar.o.unwrap_or(0.0);
    let change = close - open;
    let change_percent = if open > 0.0 { change / open * 100.0 } else { 0.0 };

    StockQuote {
        symbol: symbol.to_string(),
        price: close,
        change,
        change_percent,
        timestamp: Utc::now(),
        synthetic: false,
    }
}

/// Extracts `YYYY-MM-DD` from an RFC 3339 timestamp, passing other strings through
fn date_part(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| raw.split('T').next().unwrap_or(raw).to_string())
}
