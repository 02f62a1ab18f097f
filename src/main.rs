//! marketdash - observe cached market data from the command line
//!
//! Runs the server cache in-process (or talks to a remote one with
//! `--remote`), subscribes to the requested operation and prints the settled
//! state as JSON. `serve` exposes the server cache over HTTP instead.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::{info, warn};

use marketdash::boundary::{DataService, HttpDataService};
use marketdash::cache::TtlCache;
use marketdash::cli::{Cli, Command};
use marketdash::client::{FinancialDataClient, OrchestratorState, Subscription};
use marketdash::config::Config;
use marketdash::data::{PolygonClient, UpstreamFetcher};
use marketdash::refresh::{RefreshConfig, RefreshHandle, RefreshMessage};
use marketdash::server::{self, ServerRequestCache};
use marketdash::telemetry;

/// Upper bound on one call to the market data API
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    let config = Config::from_cli(&cli)?;

    if let Command::Serve { bind } = &cli.command {
        return serve(&config, *bind).await;
    }

    let (kind, parameters) = cli
        .command
        .operation(Utc::now().date_naive())
        .ok_or("command does not observe an operation")?;

    let service = data_service(&config)?;
    let client = FinancialDataClient::with_cache(
        service,
        config.credential.clone(),
        TtlCache::with_default_ttl(config.cache_ttl),
    );
    let subscription = client.subscribe::<Value>(kind, parameters);

    let state = subscription.wait_until_settled().await;
    print_state(&state)?;

    match config.watch_interval {
        Some(interval) => watch(&subscription, interval).await?,
        None if state.data.is_none() => std::process::exit(1),
        None => {}
    }

    Ok(())
}

/// In-process server cache, or an HTTP client for `--remote`
fn data_service(config: &Config) -> Result<Arc<dyn DataService>, Box<dyn Error>> {
    match &config.remote {
        Some(remote) => {
            info!(endpoint = %remote, "using remote backend");
            Ok(Arc::new(HttpDataService::new(remote)))
        }
        None => Ok(Arc::new(server_cache(config)?)),
    }
}

fn server_cache(config: &Config) -> Result<ServerRequestCache<PolygonClient>, Box<dyn Error>> {
    let http_client = reqwest::Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .build()?;
    let source = PolygonClient::with_base_url(config.base_url.as_str()).with_client(http_client);
    let fetcher = UpstreamFetcher::with_settings(source, config.fetcher.clone());
    let cache = Arc::new(TtlCache::with_default_ttl(config.cache_ttl));
    Ok(ServerRequestCache::new(fetcher, cache).with_coalescing(config.coalesce))
}

async fn serve(config: &Config, bind: SocketAddr) -> Result<(), Box<dyn Error>> {
    let listener = TcpListener::bind(bind).await?;
    let service: Arc<dyn DataService> = Arc::new(server_cache(config)?);

    server::http::serve(listener, service, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
    })
    .await?;

    Ok(())
}

/// Refetches on every tick and prints each settled state until Ctrl-C
async fn watch(
    subscription: &Subscription<Value>,
    interval: Duration,
) -> Result<(), Box<dyn Error>> {
    let mut refresh = RefreshHandle::spawn(RefreshConfig {
        interval,
        enabled: true,
    });
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            message = refresh.recv() => match message {
                Some(RefreshMessage::RefreshDue) => {
                    if let Err(e) = subscription.refetch().await {
                        warn!(error = %e, "refetch task failed");
                        continue;
                    }
                    print_state(&subscription.state())?;
                }
                None => break,
            },
            _ = &mut ctrl_c => break,
        }
    }

    subscription.unsubscribe();
    refresh.shutdown().await;
    Ok(())
}

fn print_state(state: &OrchestratorState<Value>) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(state)?);
    Ok(())
}
