//! Upstream data fetcher
//!
//! Translates a validated `Operation` plus credential into calls against a
//! `MarketDataSource` and normalizes the results into `MarketData`.

use std::collections::HashSet;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::operation::Operation;
use super::source::{MarketDataSource, SourceError};
use super::{
    synthetic, EconomicIndicator, MarketData, MarketStatus, StockQuote, TimeSeries,
    ValuationRatio,
};
use crate::error::ServiceError;

/// Proxy used for aggregate market value
const MARKET_PROXY_SYMBOL: &str = "SPY";

/// Approximate total US market cap at the reference SPY price
const MARKET_CAP_AT_REFERENCE: f64 = 23_000_000_000_000.0;

/// SPY price the market cap reference corresponds to
const MARKET_PROXY_REFERENCE_PRICE: f64 = 450.0;

/// Economic series used as the GDP proxy
const GDP_INDICATOR: &str = "GDP";

/// The GDP indicator is quoted in trillions of dollars
const GDP_SCALE: f64 = 1_000_000_000_000.0;

/// Symbols that hit the live API by default; everything else is simulated
pub const DEFAULT_LIVE_SYMBOLS: [&str; 3] = ["SPY", "AAPL", "X:BTCUSD"];

/// Rate-limit policy for the fetcher
#[derive(Debug, Clone)]
pub struct FetcherSettings {
    /// Symbols allowed to hit the live API
    pub live_symbols: HashSet<String>,
    /// Whether a 429 falls back to synthetic data
    pub synthetic_fallback: bool,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            live_symbols: DEFAULT_LIVE_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            synthetic_fallback: true,
        }
    }
}

impl FetcherSettings {
    fn is_live(&self, symbol: &str) -> bool {
        self.live_symbols.contains(symbol)
    }
}

/// Dispatches operations to a market data source
#[derive(Debug)]
pub struct UpstreamFetcher<S> {
    source: S,
    settings: FetcherSettings,
}

impl<S: MarketDataSource> UpstreamFetcher<S> {
    pub fn new(source: S) -> Self {
        Self::with_settings(source, FetcherSettings::default())
    }

    pub fn with_settings(source: S, settings: FetcherSettings) -> Self {
        Self { source, settings }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Runs one operation against the source
    pub async fn fetch(
        &self,
        operation: &Operation,
        credential: &str,
    ) -> Result<MarketData, ServiceError> {
        debug!(operation = %operation.kind(), "fetching upstream");
        match operation {
            Operation::SingleQuote { symbol } => {
                Ok(MarketData::Quote(self.quote(symbol, credential).await?))
            }
            Operation::MultiQuote { symbols } => {
                Ok(MarketData::Quotes(self.quotes(symbols, credential).await))
            }
            Operation::TimeSeries {
                symbol,
                timespan,
                from,
                to,
            } => {
                let series = self.time_series(symbol, timespan, *from, *to, credential).await?;
                Ok(MarketData::TimeSeries(series))
            }
            Operation::ValuationRatio => {
                Ok(MarketData::Valuation(self.valuation_ratio(credential).await?))
            }
            Operation::EconomicIndicator { indicator } => {
                Ok(MarketData::Indicator(self.indicator(indicator, credential).await?))
            }
        }
    }

    /// Same as `fetch`, serialized for caching and the boundary
    pub async fn fetch_value(
        &self,
        operation: &Operation,
        credential: &str,
    ) -> Result<Value, ServiceError> {
        let data = self.fetch(operation, credential).await?;
        serde_json::to_value(&data).map_err(|e| ServiceError::Upstream {
            status_code: None,
            message: format!("failed to encode response: {}", e),
        })
    }

    /// Quote for one symbol, honouring the live allow-list
    pub async fn quote(&self, symbol: &str, credential: &str) -> Result<StockQuote, ServiceError> {
        if !self.settings.is_live(symbol) {
            debug!(symbol, "symbol not in live list, using synthetic quote");
            return Ok(synthetic::quote(symbol));
        }

        match self.source.previous_close(symbol, credential).await {
            Ok(quote) => Ok(quote),
            Err(SourceError::RateLimited) if self.settings.synthetic_fallback => {
                info!(symbol, "rate limit exceeded, using synthetic quote");
                Ok(synthetic::quote(symbol))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Quotes for many symbols in parallel; failed symbols are dropped
    pub async fn quotes(&self, symbols: &[String], credential: &str) -> Vec<StockQuote> {
        let results = join_all(symbols.iter().map(|s| self.quote(s, credential))).await;

        let mut quotes = Vec::with_capacity(results.len());
        for (symbol, result) in symbols.iter().zip(results) {
            match result {
                Ok(quote) => quotes.push(quote),
                Err(e) => warn!(symbol = %symbol, error = %e, "dropping symbol from batch"),
            }
        }

        if quotes.len() < symbols.len() {
            warn!(
                requested = symbols.len(),
                returned = quotes.len(),
                "partial batch failure"
            );
        }
        quotes
    }

    pub async fn time_series(
        &self,
        symbol: &str,
        timespan: &str,
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
        credential: &str,
    ) -> Result<TimeSeries, ServiceError> {
        if !self.settings.is_live(symbol) {
            debug!(symbol, "symbol not in live list, using synthetic series");
            return Ok(synthetic::time_series(symbol, from, to));
        }

        match self.source.aggregates(symbol, timespan, from, to, credential).await {
            Ok(series) => Ok(TimeSeries {
                symbol: symbol.to_string(),
                series,
                synthetic: false,
            }),
            Err(SourceError::RateLimited) if self.settings.synthetic_fallback => {
                info!(symbol, "rate limit exceeded, using synthetic series");
                Ok(synthetic::time_series(symbol, from, to))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn indicator(
        &self,
        name: &str,
        credential: &str,
    ) -> Result<EconomicIndicator, ServiceError> {
        Ok(self.source.indicator(name, credential).await?)
    }

    /// Market value / GDP with its valuation band
    ///
    /// Both inputs are fetched concurrently. A zero GDP or a non-finite ratio
    /// is a `Computation` error.
    pub async fn valuation_ratio(&self, credential: &str) -> Result<ValuationRatio, ServiceError> {
        let (market_value, gdp) = futures::try_join!(
            self.market_value(credential),
            self.gdp(credential)
        )?;

        valuation_from(market_value, gdp)
    }

    /// Estimated total market value from the SPY previous close
    async fn market_value(&self, credential: &str) -> Result<f64, ServiceError> {
        let quote = self
            .source
            .previous_close(MARKET_PROXY_SYMBOL, credential)
            .await?;
        Ok(quote.price * (MARKET_CAP_AT_REFERENCE / MARKET_PROXY_REFERENCE_PRICE))
    }

    async fn gdp(&self, credential: &str) -> Result<f64, ServiceError> {
        let indicator = self.source.indicator(GDP_INDICATOR, credential).await?;
        Ok(indicator.value * GDP_SCALE)
    }
}

/// Combines market value and GDP into a classified ratio
pub fn valuation_from(market_value: f64, gdp: f64) -> Result<ValuationRatio, ServiceError> {
    if gdp == 0.0 {
        return Err(ServiceError::Computation(
            "GDP is zero, cannot compute valuation ratio".to_string(),
        ));
    }

    let ratio = market_value / gdp;
    if !ratio.is_finite() {
        return Err(ServiceError::Computation(format!(
            "valuation ratio is not finite ({} / {})",
            market_value, gdp
        )));
    }

    Ok(ValuationRatio {
        market_value,
        gdp,
        ratio,
        status: MarketStatus::classify(ratio),
    })
}
