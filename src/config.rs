//! Runtime configuration derived from CLI arguments

use std::time::Duration;

use thiserror::Error;

use crate::cli::Cli;
use crate::data::FetcherSettings;

/// Error types for configuration validation
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Cache TTL must be at least one second")]
    ZeroTtl,

    #[error("Watch interval must be at least one second")]
    ZeroWatchInterval,

    #[error("Invalid URL '{0}': expected an http:// or https:// address")]
    InvalidUrl(String),

    #[error("--live-symbols must name at least one symbol")]
    EmptyLiveSymbols,
}

/// Validated settings for one run
#[derive(Debug, Clone)]
pub struct Config {
    /// API key; never logged
    pub credential: Option<String>,
    /// Market data API root, without trailing slash
    pub base_url: String,
    /// TTL for both the server and the session cache
    pub cache_ttl: Duration,
    pub fetcher: FetcherSettings,
    /// Whether concurrent identical server requests share one upstream call
    pub coalesce: bool,
    /// Remote `marketdash serve` root, if any
    pub remote: Option<String>,
    pub watch_interval: Option<Duration>,
    pub verbose: bool,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        if cli.ttl_secs == 0 {
            return Err(ConfigError::ZeroTtl);
        }

        let watch_interval = match cli.watch {
            Some(0) => return Err(ConfigError::ZeroWatchInterval),
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        let mut fetcher = FetcherSettings {
            synthetic_fallback: !cli.no_synthetic,
            ..FetcherSettings::default()
        };
        if let Some(symbols) = &cli.live_symbols {
            fetcher.live_symbols = symbols
                .iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if fetcher.live_symbols.is_empty() {
                return Err(ConfigError::EmptyLiveSymbols);
            }
        }

        Ok(Self {
            credential: cli.api_key.clone().filter(|key| !key.trim().is_empty()),
            base_url: validate_url(&cli.base_url)?,
            cache_ttl: Duration::from_secs(cli.ttl_secs),
            fetcher,
            coalesce: !cli.no_coalesce,
            remote: cli.remote.as_deref().map(validate_url).transpose()?,
            watch_interval,
            verbose: cli.verbose,
        })
    }
}

/// Checks the scheme and strips any trailing slash
fn validate_url(url: &str) -> Result<String, ConfigError> {
    let trimmed = url.trim().trim_end_matches('/');
    let host = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"));
    match host {
        Some(host) if !host.is_empty() => Ok(trimmed.to_string()),
        _ => Err(ConfigError::InvalidUrl(url.to_string())),
    }
}
