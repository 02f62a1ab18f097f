//! Simulated market data
//!
//! Keeps the dashboard populated when a symbol is outside the live
//! allow-list or the provider rate-limits us. Everything produced here is
//! flagged `synthetic`.

use chrono::{Duration, NaiveDate, Utc};
use rand::Rng;

use super::{StockQuote, TimeSeries, TimeSeriesPoint};

/// Days covered by a time series request when no range is given
pub const DEFAULT_SERIES_DAYS: i64 = 30;

/// Plausible price level for well-known symbols
fn base_price(symbol: &str) -> Option<f64> {
    match symbol {
        "AAPL" => Some(180.15),
        "MSFT" => Some(417.88),
        "GOOGL" => Some(172.95),
        "AMZN" => Some(182.41),
        "SPY" => Some(501.02),
        "QQQ" => Some(438.27),
        "X:BTCUSD" => Some(64750.33),
        _ => None,
    }
}

/// Generates a quote within ±2% of the symbol's base price
pub fn quote(symbol: &str) -> StockQuote {
    let mut rng = rand::thread_rng();
    let base = base_price(symbol).unwrap_or_else(|| 100.0 + rng.gen_range(0.0..50.0));
    let price = base * rng.gen_range(0.98..1.02);
    let change = rng.gen_range(-3.0..3.0);

    StockQuote {
        symbol: symbol.to_string(),
        price,
        change,
        change_percent: change / price * 100.0,
        timestamp: Utc::now(),
        synthetic: true,
    }
}

/// Generates a daily random walk covering `from..=to`
pub fn time_series(symbol: &str, from: NaiveDate, to: NaiveDate) -> TimeSeries {
    let mut rng = rand::thread_rng();
    let mut price = base_price(symbol).map(f64::round).unwrap_or(100.0);
    let days = (to - from).num_days().max(0);

    let series = (0..=days)
        .filter_map(|offset| {
            let date = from.checked_add_signed(Duration::days(offset))?;
            let timestamp = date.and_hms_opt(0, 0, 0)?.and_utc();
            price *= rng.gen_range(0.98..1.02);
            Some(TimeSeriesPoint { timestamp, price })
        })
        .collect();

    TimeSeries {
        symbol: symbol.to_string(),
        series,
        synthetic: true,
    }
}
