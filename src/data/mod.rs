//! Core data models for the market dashboard
//!
//! This module contains the domain records produced by the upstream fetcher
//! (quotes, time series, valuation ratio, economic indicators) together with
//! the source clients that produce them.

pub mod fetcher;
pub mod operation;
pub mod polygon;
pub mod source;
pub mod synthetic;

pub use fetcher::{FetcherSettings, UpstreamFetcher};
pub use operation::{Operation, OperationKind, Parameters};
pub use polygon::PolygonClient;
pub use source::{MarketDataSource, SourceError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Symbols tracked by the dashboard when no explicit list is given
pub const STOCK_SYMBOLS: [&str; 7] = ["AAPL", "MSFT", "GOOGL", "AMZN", "SPY", "QQQ", "X:BTCUSD"];

/// Latest price information for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockQuote {
    /// Ticker symbol
    pub symbol: String,
    /// Last (previous close) price
    pub price: f64,
    /// Absolute change against the open
    pub change: f64,
    /// Change in percent
    pub change_percent: f64,
    /// When this quote was produced
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Set when the quote came from the simulated generator
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
}

/// A single price observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Closing prices for a symbol over a date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub symbol: String,
    pub series: Vec<TimeSeriesPoint>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
}

/// Market valuation band derived from the market value / GDP ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStatus {
    Undervalued,
    #[serde(rename = "Fair Value")]
    FairValue,
    Overvalued,
}

/// Lower bound of the fair value band
pub const FAIR_VALUE_LOWER: f64 = 0.8;

/// Lower bound of the overvalued band
pub const OVERVALUED_LOWER: f64 = 1.2;

impl MarketStatus {
    /// Classifies a ratio: `< 0.8` undervalued, `[0.8, 1.2)` fair, `>= 1.2` overvalued
    pub fn classify(ratio: f64) -> Self {
        if ratio < FAIR_VALUE_LOWER {
            MarketStatus::Undervalued
        } else if ratio < OVERVALUED_LOWER {
            MarketStatus::FairValue
        } else {
            MarketStatus::Overvalued
        }
    }
}

/// Aggregate market value compared against GDP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationRatio {
    /// Estimated total market value in dollars
    #[serde(rename = "marketCap", alias = "marketValue")]
    pub market_value: f64,
    /// GDP in dollars
    pub gdp: f64,
    /// `market_value / gdp`
    pub ratio: f64,
    pub status: MarketStatus,
}

/// Latest value of a macroeconomic series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicIndicator {
    pub name: String,
    pub value: f64,
    /// Date of the observation (`YYYY-MM-DD`), empty when unknown
    pub date: String,
}

/// Normalized result of one upstream operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MarketData {
    Quote(StockQuote),
    Quotes(Vec<StockQuote>),
    TimeSeries(TimeSeries),
    Valuation(ValuationRatio),
    Indicator(EconomicIndicator),
}
