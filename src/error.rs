//! Failure classification shared by the fetcher, the server cache and the
//! boundary.

use thiserror::Error;

/// Errors surfaced to callers of the market-data service
///
/// `MissingCredential` and `InvalidRequest` are caller errors: they are
/// reported immediately and never cached. `Upstream` and `Computation`
/// first go through the stale-data fallback.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    /// No API key was supplied
    #[error("API key is required")]
    MissingCredential,

    /// Unknown operation kind or missing/invalid parameter
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Network or API failure
    #[error("{}", upstream_message(.status_code, .message))]
    Upstream {
        status_code: Option<u16>,
        message: String,
    },

    /// Derived math could not be computed
    #[error("Computation error: {0}")]
    Computation(String),
}

fn upstream_message(status_code: &Option<u16>, message: &str) -> String {
    match status_code {
        Some(code) => format!("Upstream request failed with status {}: {}", code, message),
        None => format!("Upstream request failed: {}", message),
    }
}

impl ServiceError {
    /// HTTP-equivalent status for the boundary response
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingCredential | Self::InvalidRequest(_) => 400,
            Self::Upstream { .. } | Self::Computation(_) => 500,
        }
    }

    /// Whether the error was caused by the caller rather than the upstream
    pub fn is_caller_error(&self) -> bool {
        self.status_code() == 400
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}
