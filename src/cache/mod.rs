//! Cache module for keeping API responses in memory
//!
//! This module provides a TTL store shared by the server-side request cache
//! and the client-side session cache, plus deterministic key derivation.
//! Expired entries can still be read with an `is_expired` flag, allowing
//! stale data to be served when APIs are unavailable.

pub mod key;
mod store;

pub use key::CacheKey;
pub use store::{CachedData, TtlCache, DEFAULT_TTL};
