//! Server-side request cache
//!
//! Sits between many clients and one upstream fetcher. Identical requests
//! within the TTL window are answered from a process-wide cache, concurrent
//! identical requests can share one upstream call, and upstream failures fall
//! back to the last cached value for the key.

pub mod http;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tracing::{debug, warn};

use crate::boundary::{DataRequest, DataResponse, DataService, ResponseBody};
use crate::cache::{CacheKey, TtlCache};
use crate::data::{MarketDataSource, Operation, OperationKind, UpstreamFetcher};
use crate::error::ServiceError;

/// Advisory text attached to stale responses
pub const STALE_DATA_MESSAGE: &str = "Failed to fetch fresh data, using cached data";

type SharedFetch = Shared<BoxFuture<'static, Result<Value, ServiceError>>>;

/// Outcome of a successfully served request
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub data: Value,
    /// The upstream fetcher was not called for this response
    pub served_from_cache: bool,
    /// Why a fresh fetch failed, when `data` is a stale fallback
    pub refresh_error: Option<ServiceError>,
}

impl FetchResult {
    fn fresh(data: Value) -> Self {
        Self {
            data,
            served_from_cache: false,
            refresh_error: None,
        }
    }

    fn cached(data: Value) -> Self {
        Self {
            data,
            served_from_cache: true,
            refresh_error: None,
        }
    }

    fn stale(data: Value, error: ServiceError) -> Self {
        Self {
            data,
            served_from_cache: true,
            refresh_error: Some(error),
        }
    }

    pub fn is_stale(&self) -> bool {
        self.refresh_error.is_some()
    }

    /// Wire response for this result
    pub fn into_response(self) -> DataResponse {
        let error = self
            .refresh_error
            .as_ref()
            .map(|e| format!("{}: {}", STALE_DATA_MESSAGE, e));

        DataResponse::ok(ResponseBody {
            stale: error.is_some(),
            cached: self.served_from_cache,
            error,
            data: Some(self.data),
        })
    }
}

/// Process-wide TTL cache in front of the upstream fetcher
pub struct ServerRequestCache<S> {
    fetcher: Arc<UpstreamFetcher<S>>,
    cache: Arc<TtlCache<Value>>,
    in_flight: Mutex<HashMap<CacheKey, SharedFetch>>,
    coalesce: bool,
}

impl<S: MarketDataSource + 'static> ServerRequestCache<S> {
    /// Wraps `fetcher` with the given cache; coalescing is enabled
    pub fn new(fetcher: UpstreamFetcher<S>, cache: Arc<TtlCache<Value>>) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            cache,
            in_flight: Mutex::new(HashMap::new()),
            coalesce: true,
        }
    }

    /// Enables or disables sharing of concurrent identical upstream calls
    pub fn with_coalescing(mut self, enabled: bool) -> Self {
        self.coalesce = enabled;
        self
    }

    pub fn cache(&self) -> &TtlCache<Value> {
        &self.cache
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<CacheKey, SharedFetch>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serves one request
    ///
    /// Caller errors are returned before the cache is consulted. A fresh
    /// cache entry is returned without calling upstream. On upstream failure
    /// the last stored value for the key is returned as stale, and the error
    /// only propagates when no such value exists.
    pub async fn handle(&self, request: &DataRequest) -> Result<FetchResult, ServiceError> {
        let credential = request
            .credential
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(ServiceError::MissingCredential)?;
        let kind: OperationKind = request.operation_kind.parse()?;
        let operation = Operation::parse(kind, &request.parameters)?;
        let key = CacheKey::derive(kind, &request.parameters, credential);

        if let Some(hit) = self.cache.read(key.as_str()) {
            if !hit.is_expired {
                debug!(operation = %kind, "serving from server cache");
                return Ok(FetchResult::cached(hit.data));
            }
        }

        match self.fetch_fresh(&key, operation, credential).await {
            Ok(data) => {
                self.cache.set(key.as_str(), data.clone());
                Ok(FetchResult::fresh(data))
            }
            Err(error) => self.fall_back(kind, &key, error),
        }
    }

    /// Calls upstream, sharing the call with concurrent requests for `key`
    async fn fetch_fresh(
        &self,
        key: &CacheKey,
        operation: Operation,
        credential: &str,
    ) -> Result<Value, ServiceError> {
        if !self.coalesce {
            return self.fetcher.fetch_value(&operation, credential).await;
        }

        let shared = {
            let mut in_flight = self.in_flight();
            in_flight
                .entry(key.clone())
                .or_insert_with(|| {
                    let fetcher = Arc::clone(&self.fetcher);
                    let credential = credential.to_string();
                    async move { fetcher.fetch_value(&operation, &credential).await }
                        .boxed()
                        .shared()
                })
                .clone()
        };

        let result = shared.clone().await;

        let mut in_flight = self.in_flight();
        if in_flight
            .get(key)
            .is_some_and(|current| current.ptr_eq(&shared))
        {
            in_flight.remove(key);
        }
        result
    }

    /// Second step of the pipeline: any stored value beats an error
    fn fall_back(
        &self,
        kind: OperationKind,
        key: &CacheKey,
        error: ServiceError,
    ) -> Result<FetchResult, ServiceError> {
        match self.cache.read(key.as_str()) {
            Some(previous) => {
                warn!(
                    operation = %kind,
                    error = %error,
                    "upstream failed, serving stale cached data"
                );
                Ok(FetchResult::stale(previous.data, error))
            }
            None => {
                warn!(operation = %kind, error = %error, "upstream failed with no cached data");
                Err(error)
            }
        }
    }
}

#[async_trait]
impl<S: MarketDataSource + 'static> DataService for ServerRequestCache<S> {
    async fn call(&self, request: DataRequest) -> DataResponse {
        match self.handle(&request).await {
            Ok(result) => result.into_response(),
            Err(e) => {
                if e.is_caller_error() {
                    debug!(error = %e, "rejected request");
                }
                DataResponse::failure(e.status_code(), e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::advance;

    use crate::data::{
        EconomicIndicator, FetcherSettings, Parameters, SourceError, StockQuote, TimeSeriesPoint,
    };

    /// Source whose failure mode can be toggled between calls
    #[derive(Default)]
    struct ToggleSource {
        failing: AtomicBool,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl MarketDataSource for ToggleSource {
        async fn previous_close(
            &self,
            symbol: &str,
            _credential: &str,
        ) -> Result<StockQuote, SourceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(SourceError::Status {
                    status: 502,
                    message: "Bad Gateway".to_string(),
                });
            }
            Ok(StockQuote {
                symbol: symbol.to_string(),
                price: 100.0 + call as f64,
                change: 0.0,
                change_percent: 0.0,
                timestamp: Utc::now(),
                synthetic: false,
            })
        }

        async fn aggregates(
            &self,
            _symbol: &str,
            _timespan: &str,
            _from: NaiveDate,
            _to: NaiveDate,
            _credential: &str,
        ) -> Result<Vec<TimeSeriesPoint>, SourceError> {
            Err(SourceError::MissingField("results".to_string()))
        }

        async fn indicator(
            &self,
            _name: &str,
            _credential: &str,
        ) -> Result<EconomicIndicator, SourceError> {
            Err(SourceError::MissingField("results".to_string()))
        }
    }

    fn server(source: ToggleSource) -> ServerRequestCache<ToggleSource> {
        let fetcher = UpstreamFetcher::with_settings(source, FetcherSettings::default());
        ServerRequestCache::new(fetcher, Arc::new(TtlCache::new()))
    }

    fn quote_request(symbol: &str, credential: Option<&str>) -> DataRequest {
        let mut parameters = Parameters::new();
        parameters.insert("symbol".to_string(), json!(symbol));
        DataRequest::new(
            OperationKind::SingleQuote,
            parameters,
            credential.map(str::to_string),
        )
    }

    fn calls(server: &ServerRequestCache<ToggleSource>) -> usize {
        server.fetcher.source().calls.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_missing_credential_fails_fast() {
        let server = server(ToggleSource::default());

        let err = server.handle(&quote_request("AAPL", None)).await.unwrap_err();
        assert_eq!(err, ServiceError::MissingCredential);

        let err = server.handle(&quote_request("AAPL", Some("  "))).await.unwrap_err();
        assert_eq!(err, ServiceError::MissingCredential);
        assert_eq!(calls(&server), 0);
    }

    #[tokio::test]
    async fn test_invalid_kind_and_parameters() {
        let server = server(ToggleSource::default());

        let mut request = quote_request("AAPL", Some("k"));
        request.operation_kind = "order-book".to_string();
        let err = server.handle(&request).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));

        let mut request = quote_request("AAPL", Some("k"));
        request.parameters.clear();
        let err = server.handle(&request).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));

        assert_eq!(calls(&server), 0);
        assert!(server.cache().is_empty(), "caller errors are never cached");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_window_scenario() {
        let server = server(ToggleSource::default());
        let request = quote_request("AAPL", Some("k"));

        let first = server.handle(&request).await.unwrap();
        assert!(!first.served_from_cache);
        assert_eq!(calls(&server), 1);

        advance(Duration::from_secs(10)).await;
        let second = server.handle(&request).await.unwrap();
        assert!(second.served_from_cache);
        assert_eq!(second.data, first.data);
        assert_eq!(calls(&server), 1);

        advance(Duration::from_secs(51)).await;
        let third = server.handle(&request).await.unwrap();
        assert!(!third.served_from_cache);
        assert_eq!(calls(&server), 2);
        assert_ne!(third.data["price"], first.data["price"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fallback_after_upstream_failure() {
        let server = server(ToggleSource::default());
        let request = quote_request("AAPL", Some("k"));

        let fresh = server.handle(&request).await.unwrap();

        advance(Duration::from_secs(61)).await;
        server.fetcher.source().failing.store(true, Ordering::SeqCst);

        let stale = server.handle(&request).await.unwrap();
        assert!(stale.is_stale());
        assert!(stale.served_from_cache);
        assert_eq!(stale.data, fresh.data);
        assert!(!stale.refresh_error.unwrap().to_string().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_without_cache_propagates() {
        let source = ToggleSource::default();
        source.failing.store(true, Ordering::SeqCst);
        let server = server(source);

        let err = server.handle(&quote_request("AAPL", Some("k"))).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Upstream {
                status_code: Some(502),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_credentials_do_not_share_entries() {
        let server = server(ToggleSource::default());

        server.handle(&quote_request("AAPL", Some("tenant-a"))).await.unwrap();
        let other = server.handle(&quote_request("AAPL", Some("tenant-b"))).await.unwrap();

        assert!(!other.served_from_cache);
        assert_eq!(calls(&server), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_coalesce() {
        let server = server(ToggleSource {
            delay: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        let request = quote_request("AAPL", Some("k"));

        let (a, b) = tokio::join!(server.handle(&request), server.handle(&request));

        assert_eq!(a.unwrap().data, b.unwrap().data);
        assert_eq!(calls(&server), 1);
        assert!(server.in_flight().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_without_coalescing() {
        let server = server(ToggleSource {
            delay: Some(Duration::from_millis(100)),
            ..Default::default()
        })
        .with_coalescing(false);
        let request = quote_request("AAPL", Some("k"));

        let (a, b) = tokio::join!(server.handle(&request), server.handle(&request));

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(calls(&server), 2);
    }

    #[tokio::test]
    async fn test_call_maps_results_to_wire_responses() {
        let server = server(ToggleSource::default());

        let ok = server.call(quote_request("AAPL", Some("k"))).await;
        assert_eq!(ok.status, 200);
        assert!(ok.body.data.is_some());
        assert!(!ok.body.cached);

        let cached = server.call(quote_request("AAPL", Some("k"))).await;
        assert!(cached.body.cached);

        let missing = server.call(quote_request("AAPL", None)).await;
        assert_eq!(missing.status, 400);
        assert_eq!(missing.body.error.as_deref(), Some("API key is required"));
        assert!(missing.body.data.is_none());
    }

    #[test]
    fn test_stale_result_response() {
        let result = FetchResult::stale(
            json!({"price": 1.0}),
            ServiceError::Upstream {
                status_code: Some(502),
                message: "Bad Gateway".to_string(),
            },
        );
        let response = result.into_response();

        assert_eq!(response.status, 200);
        assert!(response.body.stale);
        assert!(response.body.cached);
        let error = response.body.error.unwrap();
        assert!(error.starts_with(STALE_DATA_MESSAGE));
        assert!(error.contains("502"));
    }
}
