//! Client fetch orchestrator
//!
//! A `FinancialDataClient` represents one session: it owns the session's
//! TTL cache and credential and hands out `Subscription`s, each of which runs
//! the loading/ready/error state machine for one `(kind, parameters)` identity.

mod state;
mod subscription;

pub use state::{OrchestratorState, Phase};
pub use subscription::Subscription;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::boundary::DataService;
use crate::cache::TtlCache;
use crate::data::{OperationKind, Parameters};

/// Shared by every subscription of one client
pub(crate) struct Session {
    pub(crate) service: Arc<dyn DataService>,
    pub(crate) credential: Option<String>,
    pub(crate) cache: TtlCache<Value>,
}

/// Entry point for consumers of market data
#[derive(Clone)]
pub struct FinancialDataClient {
    session: Arc<Session>,
}

impl FinancialDataClient {
    /// Creates a client with a 60 second session cache
    pub fn new(service: Arc<dyn DataService>, credential: Option<String>) -> Self {
        Self::with_cache(service, credential, TtlCache::new())
    }

    /// Creates a client around an explicitly constructed session cache
    pub fn with_cache(
        service: Arc<dyn DataService>,
        credential: Option<String>,
        cache: TtlCache<Value>,
    ) -> Self {
        Self {
            session: Arc::new(Session {
                service,
                credential,
                cache,
            }),
        }
    }

    pub fn cache(&self) -> &TtlCache<Value> {
        &self.session.cache
    }

    /// Starts observing `(kind, parameters)`
    ///
    /// The first load is spawned on the current tokio runtime, so this must be
    /// called from within one.
    pub fn subscribe<T>(&self, kind: OperationKind, parameters: Parameters) -> Subscription<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        Subscription::start(Arc::clone(&self.session), kind, parameters)
    }
}
