//! Operation kinds and parameter validation
//!
//! A boundary request names an operation kind and carries a loosely typed
//! parameter map. `Operation::parse` turns the pair into a typed operation
//! or an `InvalidRequest` error.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde_json::Value;

use crate::error::ServiceError;

/// Longest `from..=to` range a time series request may cover, in days
pub const MAX_SERIES_SPAN_DAYS: i64 = 366;

/// Request parameters, kept sorted so their serialization is stable
pub type Parameters = BTreeMap<String, Value>;

/// The recognized operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    SingleQuote,
    MultiQuote,
    TimeSeries,
    ValuationRatio,
    EconomicIndicator,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::SingleQuote,
        OperationKind::MultiQuote,
        OperationKind::TimeSeries,
        OperationKind::ValuationRatio,
        OperationKind::EconomicIndicator,
    ];

    /// Canonical wire name
    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationKind::SingleQuote => "single-quote",
            OperationKind::MultiQuote => "multi-quote",
            OperationKind::TimeSeries => "time-series",
            OperationKind::ValuationRatio => "valuation-ratio",
            OperationKind::EconomicIndicator => "economic-indicator",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ServiceError;

    /// Parses canonical names and the older dashboard names
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single-quote" | "stock-quote" => Ok(OperationKind::SingleQuote),
            "multi-quote" | "multiple-stock-quotes" => Ok(OperationKind::MultiQuote),
            "time-series" | "stock-time-series" => Ok(OperationKind::TimeSeries),
            "valuation-ratio" | "buffett-indicator" => Ok(OperationKind::ValuationRatio),
            "economic-indicator" => Ok(OperationKind::EconomicIndicator),
            _ => Err(ServiceError::invalid(format!("unknown operation kind '{}'", s))),
        }
    }
}

/// A validated operation ready for the upstream fetcher
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    SingleQuote {
        symbol: String,
    },
    MultiQuote {
        symbols: Vec<String>,
    },
    TimeSeries {
        symbol: String,
        timespan: String,
        from: NaiveDate,
        to: NaiveDate,
    },
    ValuationRatio,
    EconomicIndicator {
        indicator: String,
    },
}

impl Operation {
    /// Validates the parameters required by `kind`
    pub fn parse(kind: OperationKind, parameters: &Parameters) -> Result<Self, ServiceError> {
        match kind {
            OperationKind::SingleQuote => Ok(Operation::SingleQuote {
                symbol: required_str(parameters, "symbol")?,
            }),
            OperationKind::MultiQuote => Ok(Operation::MultiQuote {
                symbols: required_symbols(parameters)?,
            }),
            OperationKind::TimeSeries => {
                let symbol = required_str(parameters, "symbol")?;
                let timespan = required_str(parameters, "timespan")?;
                let from = required_date(parameters, "from")?;
                let to = required_date(parameters, "to")?;
                if from > to {
                    return Err(ServiceError::invalid(format!(
                        "'from' ({}) is after 'to' ({})",
                        from, to
                    )));
                }
                if (to - from).num_days() > MAX_SERIES_SPAN_DAYS {
                    return Err(ServiceError::invalid(format!(
                        "date range {}..{} exceeds {} days",
                        from, to, MAX_SERIES_SPAN_DAYS
                    )));
                }
                Ok(Operation::TimeSeries {
                    symbol,
                    timespan,
                    from,
                    to,
                })
            }
            OperationKind::ValuationRatio => Ok(Operation::ValuationRatio),
            OperationKind::EconomicIndicator => Ok(Operation::EconomicIndicator {
                indicator: required_str(parameters, "indicator")?.to_uppercase(),
            }),
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::SingleQuote { .. } => OperationKind::SingleQuote,
            Operation::MultiQuote { .. } => OperationKind::MultiQuote,
            Operation::TimeSeries { .. } => OperationKind::TimeSeries,
            Operation::ValuationRatio => OperationKind::ValuationRatio,
            Operation::EconomicIndicator { .. } => OperationKind::EconomicIndicator,
        }
    }
}

fn required_str(parameters: &Parameters, name: &str) -> Result<String, ServiceError> {
    match parameters.get(name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(_) => Err(ServiceError::invalid(format!(
            "parameter '{}' must be a non-empty string",
            name
        ))),
        None => Err(ServiceError::invalid(format!("missing parameter '{}'", name))),
    }
}

fn required_date(parameters: &Parameters, name: &str) -> Result<NaiveDate, ServiceError> {
    let raw = required_str(parameters, name)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
        ServiceError::invalid(format!("parameter '{}' must be a YYYY-MM-DD date", name))
    })
}

fn required_symbols(parameters: &Parameters) -> Result<Vec<String>, ServiceError> {
    let invalid =
        || ServiceError::invalid("parameter 'symbols' must be a non-empty list of strings");

    let list = match parameters.get("symbols") {
        Some(Value::Array(list)) => list,
        Some(_) => return Err(invalid()),
        None => return Err(ServiceError::invalid("missing parameter 'symbols'")),
    };

    let symbols = list
        .iter()
        .map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            _ => Err(invalid()),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if symbols.is_empty() {
        return Err(invalid());
    }
    Ok(symbols)
}
