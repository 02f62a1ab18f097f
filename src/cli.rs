//! Command-line interface parsing for marketdash
//!
//! Global flags configure the data backend; the subcommand selects the
//! operation to observe, or `serve` to expose the backend over HTTP.

use std::net::SocketAddr;

use chrono::{Duration as ChronoDuration, NaiveDate};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use crate::data::polygon::POLYGON_BASE_URL;
use crate::data::synthetic::DEFAULT_SERIES_DAYS;
use crate::data::{OperationKind, Parameters, STOCK_SYMBOLS};

/// Default listen address for `serve`
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// marketdash - cached market data for the financial dashboard
#[derive(Parser, Debug)]
#[command(name = "marketdash")]
#[command(about = "Market quotes, time series and valuation data with two-tier caching")]
#[command(version)]
pub struct Cli {
    /// Market data API key
    #[arg(long, env = "MARKETDASH_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Root URL of the market data API
    #[arg(long, env = "MARKETDASH_BASE_URL", default_value = POLYGON_BASE_URL)]
    pub base_url: String,

    /// Lifetime of cache entries, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub ttl_secs: u64,

    /// Symbols allowed to hit the live API (comma separated)
    ///
    /// Every other symbol is served from synthetic data.
    #[arg(long, value_name = "SYMBOLS", value_delimiter = ',')]
    pub live_symbols: Option<Vec<String>>,

    /// Report rate limiting as an error instead of serving synthetic quotes
    #[arg(long)]
    pub no_synthetic: bool,

    /// Send every concurrent identical request upstream
    #[arg(long)]
    pub no_coalesce: bool,

    /// Use a running `marketdash serve` instead of an in-process backend
    #[arg(long, value_name = "URL")]
    pub remote: Option<String>,

    /// Keep running and refetch every SECS seconds
    #[arg(long, value_name = "SECS")]
    pub watch: Option<u64>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Latest quote for one symbol
    Quote { symbol: String },

    /// Quotes for several symbols (defaults to the dashboard list)
    Quotes {
        #[arg(value_delimiter = ',')]
        symbols: Vec<String>,
    },

    /// Daily price history for one symbol
    Series {
        symbol: String,
        /// Aggregation window (day, week, month)
        #[arg(long, default_value = "day")]
        timespan: String,
        /// First date, YYYY-MM-DD (defaults to 30 days before --to)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last date, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Market value to GDP ratio
    Valuation,

    /// Latest value of an economic indicator, e.g. GDP
    Indicator { name: String },

    /// Serve POST /api/financial-data over HTTP
    Serve {
        #[arg(long, default_value = DEFAULT_BIND)]
        bind: SocketAddr,
    },
}

impl Command {
    /// Operation kind and parameters this command observes
    ///
    /// `None` for `serve`. `today` anchors the default series window.
    pub fn operation(&self, today: NaiveDate) -> Option<(OperationKind, Parameters)> {
        let mut parameters = Parameters::new();
        let kind = match self {
            Command::Quote { symbol } => {
                parameters.insert("symbol".to_string(), json!(symbol.to_uppercase()));
                OperationKind::SingleQuote
            }
            Command::Quotes { symbols } => {
                let symbols: Vec<Value> = if symbols.is_empty() {
                    STOCK_SYMBOLS.iter().map(|s| json!(s)).collect()
                } else {
                    symbols.iter().map(|s| json!(s.to_uppercase())).collect()
                };
                parameters.insert("symbols".to_string(), Value::Array(symbols));
                OperationKind::MultiQuote
            }
            Command::Series {
                symbol,
                timespan,
                from,
                to,
            } => {
                let to = to.unwrap_or(today);
                let from = from.unwrap_or(to - ChronoDuration::days(DEFAULT_SERIES_DAYS));
                parameters.insert("symbol".to_string(), json!(symbol.to_uppercase()));
                parameters.insert("timespan".to_string(), json!(timespan));
                parameters.insert("from".to_string(), json!(from.to_string()));
                parameters.insert("to".to_string(), json!(to.to_string()));
                OperationKind::TimeSeries
            }
            Command::Valuation => OperationKind::ValuationRatio,
            Command::Indicator { name } => {
                parameters.insert("indicator".to_string(), json!(name));
                OperationKind::EconomicIndicator
            }
            Command::Serve { .. } => return None,
        };
        Some((kind, parameters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
    }

    #[test]
    fn test_cli_parse_quote() {
        let cli = Cli::parse_from(["marketdash", "--api-key", "k", "quote", "aapl"]);
        assert_eq!(cli.api_key.as_deref(), Some("k"));
        assert_eq!(
            cli.command,
            Command::Quote {
                symbol: "aapl".to_string()
            }
        );
        assert_eq!(cli.ttl_secs, 60);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_parse_global_flags() {
        let cli = Cli::parse_from([
            "marketdash",
            "--ttl-secs",
            "5",
            "--live-symbols",
            "SPY,QQQ",
            "--no-synthetic",
            "--no-coalesce",
            "--watch",
            "30",
            "-v",
            "valuation",
        ]);
        assert_eq!(cli.ttl_secs, 5);
        assert_eq!(
            cli.live_symbols,
            Some(vec!["SPY".to_string(), "QQQ".to_string()])
        );
        assert!(cli.no_synthetic);
        assert!(cli.no_coalesce);
        assert_eq!(cli.watch, Some(30));
        assert!(cli.verbose);
        assert_eq!(cli.command, Command::Valuation);
    }

    #[test]
    fn test_cli_parse_serve_default_bind() {
        let cli = Cli::parse_from(["marketdash", "serve"]);
        assert_eq!(
            cli.command,
            Command::Serve {
                bind: DEFAULT_BIND.parse().unwrap()
            }
        );
    }

    #[test]
    fn test_cli_rejects_bad_date() {
        let result = Cli::try_parse_from(["marketdash", "series", "SPY", "--from", "yesterday"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_quote_operation_uppercases_symbol() {
        let command = Command::Quote {
            symbol: "msft".to_string(),
        };
        let (kind, parameters) = command.operation(today()).unwrap();
        assert_eq!(kind, OperationKind::SingleQuote);
        assert_eq!(parameters["symbol"], "MSFT");
    }

    #[test]
    fn test_quotes_operation_defaults_to_dashboard_symbols() {
        let command = Command::Quotes { symbols: vec![] };
        let (kind, parameters) = command.operation(today()).unwrap();
        assert_eq!(kind, OperationKind::MultiQuote);
        assert_eq!(parameters["symbols"].as_array().unwrap().len(), STOCK_SYMBOLS.len());
    }

    #[test]
    fn test_series_operation_default_window() {
        let command = Command::Series {
            symbol: "spy".to_string(),
            timespan: "day".to_string(),
            from: None,
            to: None,
        };
        let (kind, parameters) = command.operation(today()).unwrap();
        assert_eq!(kind, OperationKind::TimeSeries);
        assert_eq!(parameters["to"], "2024-03-31");
        assert_eq!(parameters["from"], "2024-03-01");
        assert_eq!(parameters["timespan"], "day");
    }

    #[test]
    fn test_indicator_and_valuation_operations() {
        let (kind, parameters) = Command::Valuation.operation(today()).unwrap();
        assert_eq!(kind, OperationKind::ValuationRatio);
        assert!(parameters.is_empty());

        let command = Command::Indicator {
            name: "gdp".to_string(),
        };
        let (kind, parameters) = command.operation(today()).unwrap();
        assert_eq!(kind, OperationKind::EconomicIndicator);
        assert_eq!(parameters["indicator"], "gdp");
    }

    #[test]
    fn test_serve_has_no_operation() {
        let command = Command::Serve {
            bind: DEFAULT_BIND.parse().unwrap(),
        };
        assert!(command.operation(today()).is_none());
    }
}
