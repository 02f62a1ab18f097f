//! Cache key derivation
//!
//! A key is built from the operation kind, its parameters and the caller's
//! credential. Parameters live in a `BTreeMap`, and `serde_json` objects are
//! sorted maps too, so the serialized form does not depend on insertion order.

use std::fmt;

use crate::data::{OperationKind, Parameters};

/// Deterministic identifier for a request signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for `(kind, parameters, credential)`
    ///
    /// The credential is part of the key so that callers with different API
    /// keys never see each other's cached data.
    pub fn derive(kind: OperationKind, parameters: &Parameters, credential: &str) -> Self {
        // Serializing a map of JSON values cannot fail
        let params = serde_json::to_string(parameters).unwrap_or_default();
        Self(format!("{}:{}:{}", kind.as_str(), params, credential))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}
