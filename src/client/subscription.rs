//! Per-identity fetch state machine
//!
//! Every load takes a generation number. A result is applied only while the
//! subscription is active and only if no newer generation has been applied,
//! so late responses never overwrite fresher state and never reach a
//! consumer that has unsubscribed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::state::OrchestratorState;
use super::Session;
use crate::boundary::{DataRequest, DataResponse};
use crate::cache::CacheKey;
use crate::data::{OperationKind, Parameters};

/// What a subscription is currently observing
struct Identity {
    kind: OperationKind,
    parameters: Parameters,
}

/// Result of one load, before it is applied to the state
enum Outcome<T> {
    Ready {
        data: T,
        cached: bool,
        stale: bool,
        advisory: Option<String>,
    },
    Failed(String),
}

struct Inner<T> {
    session: Arc<Session>,
    identity: Mutex<Identity>,
    state: watch::Sender<OrchestratorState<T>>,
    /// Last generation handed out
    issued: AtomicU64,
    /// Last generation applied (or the floor set by `retarget`)
    applied: Mutex<u64>,
    active: AtomicBool,
}

/// Handle to one `(kind, parameters)` subscription
///
/// Dropping the handle unsubscribes.
pub struct Subscription<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Subscription<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn start(
        session: Arc<Session>,
        kind: OperationKind,
        parameters: Parameters,
    ) -> Self {
        let (state, _) = watch::channel(OrchestratorState::loading());
        let subscription = Self {
            inner: Arc::new(Inner {
                session,
                identity: Mutex::new(Identity { kind, parameters }),
                state,
                issued: AtomicU64::new(0),
                applied: Mutex::new(0),
                active: AtomicBool::new(true),
            }),
        };
        subscription.spawn_load(false);
        subscription
    }

    /// A receiver notified on every state transition
    pub fn watch(&self) -> watch::Receiver<OrchestratorState<T>> {
        self.inner.state.subscribe()
    }

    /// Reloads bypassing the session cache
    pub fn refetch(&self) -> JoinHandle<()> {
        self.spawn_load(true)
    }

    /// Switches to a new identity and loads it
    ///
    /// Results still in flight for the previous identity are discarded.
    pub fn retarget(&self, kind: OperationKind, parameters: Parameters) -> JoinHandle<()> {
        *self.inner.identity() = Identity { kind, parameters };
        {
            let issued = self.inner.issued.load(Ordering::SeqCst);
            let mut applied = self.inner.applied();
            *applied = (*applied).max(issued);
        }
        if self.is_active() {
            self.inner.state.send_replace(OrchestratorState::loading());
        }
        self.spawn_load(false)
    }

    /// Stops applying results; the current state is kept as is
    pub fn unsubscribe(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    fn spawn_load(&self, force: bool) -> JoinHandle<()> {
        let generation = self.inner.begin();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.load(generation, force).await })
    }
}

impl<T> Subscription<T>
where
    T: Clone + DeserializeOwned + Send + Sync + 'static,
{
    /// Snapshot of the current state
    pub fn state(&self) -> OrchestratorState<T> {
        self.inner.state.borrow().clone()
    }

    /// Waits until no load is pending and returns the state
    pub async fn wait_until_settled(&self) -> OrchestratorState<T> {
        let mut receiver = self.watch();
        let settled = receiver.wait_for(|state| !state.is_loading).await;
        match settled {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.inner.active.store(false, Ordering::SeqCst);
    }
}

impl<T> Inner<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn identity(&self) -> MutexGuard<'_, Identity> {
        self.identity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn applied(&self) -> MutexGuard<'_, u64> {
        self.applied.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Hands out the next generation and marks the state as loading
    fn begin(&self) -> u64 {
        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        if self.is_active() {
            self.state.send_modify(|state| {
                state.is_loading = true;
                state.error = None;
            });
        }
        generation
    }

    async fn load(&self, generation: u64, force: bool) {
        let (kind, parameters) = {
            let identity = self.identity();
            (identity.kind, identity.parameters.clone())
        };
        let session = &self.session;
        let credential = session.credential.as_deref().unwrap_or_default();
        let key = CacheKey::derive(kind, &parameters, credential);

        if !force {
            if let Some(value) = session.cache.get(key.as_str()) {
                match serde_json::from_value::<T>(value) {
                    Ok(data) => {
                        debug!(operation = %kind, "serving from session cache");
                        self.apply(
                            generation,
                            Outcome::Ready {
                                data,
                                cached: true,
                                stale: false,
                                advisory: None,
                            },
                        );
                        return;
                    }
                    Err(e) => {
                        warn!(
                            operation = %kind,
                            error = %e,
                            "dropping undecodable session cache entry"
                        );
                        session.cache.delete(key.as_str());
                    }
                }
            }
        }

        let request = DataRequest::new(kind, parameters, session.credential.clone());
        let response = session.service.call(request).await;
        let outcome = self.settle(kind, &key, response);
        self.apply(generation, outcome);
    }

    /// Interprets a boundary response, falling back to the session cache
    fn settle(&self, kind: OperationKind, key: &CacheKey, response: DataResponse) -> Outcome<T> {
        let cache = &self.session.cache;
        let success = response.is_success();
        let DataResponse { status, body } = response;

        let failure = if success {
            match body.data {
                Some(value) => match serde_json::from_value::<T>(value.clone()) {
                    Ok(data) if body.stale => {
                        return Outcome::Ready {
                            data,
                            cached: true,
                            stale: true,
                            advisory: body.error,
                        };
                    }
                    Ok(data) => {
                        cache.set(key.as_str(), value);
                        return Outcome::Ready {
                            data,
                            cached: body.cached,
                            stale: false,
                            advisory: None,
                        };
                    }
                    Err(e) => format!("Unexpected response data: {}", e),
                },
                None => body
                    .error
                    .unwrap_or_else(|| "Response contained no data".to_string()),
            }
        } else {
            body.error
                .unwrap_or_else(|| format!("Request failed with status {}", status))
        };

        warn!(operation = %kind, status, error = %failure, "fetch failed");

        let previous = cache
            .read(key.as_str())
            .and_then(|cached| serde_json::from_value::<T>(cached.data).ok());
        match previous {
            Some(data) => Outcome::Ready {
                data,
                cached: true,
                stale: true,
                advisory: Some(failure),
            },
            None => Outcome::Failed(failure),
        }
    }

    fn apply(&self, generation: u64, outcome: Outcome<T>) {
        if !self.is_active() {
            debug!(generation, "discarding result for inactive subscription");
            return;
        }

        let latest = self.issued.load(Ordering::SeqCst);
        let applied = self.state.send_if_modified(|state| {
            let mut applied = self.applied();
            if !self.is_active() || generation <= *applied {
                return false;
            }
            *applied = generation;
            state.is_loading = generation < latest;

            match outcome {
                Outcome::Ready {
                    data,
                    cached,
                    stale,
                    advisory,
                } => {
                    state.data = Some(data);
                    state.is_cached = cached;
                    state.is_stale = stale;
                    state.error = advisory;
                }
                Outcome::Failed(message) => {
                    // Data already on screen for this identity stays visible
                    let has_data = state.data.is_some();
                    state.is_cached = has_data;
                    state.is_stale = has_data;
                    state.error = Some(message);
                }
            }
            true
        });

        if !applied {
            debug!(generation, "discarding out-of-order result");
        }
    }
}
