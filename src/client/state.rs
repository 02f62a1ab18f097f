//! Observable state of a subscription

use serde::Serialize;

/// Coarse position in the fetch lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    Error,
}

/// What a consumer renders for one subscription
///
/// `error` is advisory when `data` is present (stale data is still shown)
/// and terminal when it is not.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorState<T> {
    pub data: Option<T>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub is_cached: bool,
    pub is_stale: bool,
}

impl<T> Default for OrchestratorState<T> {
    fn default() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
            is_cached: false,
            is_stale: false,
        }
    }
}

impl<T> OrchestratorState<T> {
    pub(crate) fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> Phase {
        match (self.is_loading, &self.data, &self.error) {
            (true, _, _) => Phase::Loading,
            (false, Some(_), _) => Phase::Ready,
            (false, None, Some(_)) => Phase::Error,
            (false, None, None) => Phase::Idle,
        }
    }
}
