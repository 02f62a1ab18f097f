//! In-memory TTL cache store
//!
//! Provides a `TtlCache` that keeps values in memory with expiry timestamps.
//! Expired entries are removed lazily by `get`, while `read` still hands them
//! out with an `is_expired` flag so callers can fall back to stale data when
//! the upstream API is unavailable.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Default time-to-live for cache entries (matches the API refresh cadence)
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Smallest TTL accepted, so that `expires_at > created_at` always holds
const MIN_TTL: Duration = Duration::from_millis(1);

/// A value stored in the cache together with its timestamps
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    /// The cached value
    value: V,
    /// When the value was stored
    created_at: Instant,
    /// When the value stops being fresh
    expires_at: Instant,
}

/// Result of reading from cache, including metadata about cache freshness
#[derive(Debug, Clone)]
pub struct CachedData<V> {
    /// The cached data
    pub data: V,
    /// When the data was stored
    pub cached_at: Instant,
    /// Whether the cache entry has expired
    pub is_expired: bool,
}

/// Keyed in-memory store with per-entry expiry
///
/// Entries are never mutated in place: `set` replaces whatever was stored
/// under the key. All operations are synchronous and the internal lock is
/// never held across an await point.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    default_ttl: Duration,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> TtlCache<V> {
    /// Creates an empty cache using the 60 second default TTL
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    /// Creates an empty cache with a custom default TTL
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl: default_ttl.max(MIN_TTL),
        }
    }

    /// The TTL applied by `set`
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the stored value if it is still fresh
    ///
    /// An expired entry is removed and `None` is returned.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries();
        let now = Instant::now();

        match entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Reads an entry regardless of freshness
    ///
    /// Returns `Some(CachedData)` with `is_expired = true` for entries past
    /// their TTL, allowing for graceful degradation when APIs are unavailable.
    /// Unlike `get`, this never removes anything.
    pub fn read(&self, key: &str) -> Option<CachedData<V>> {
        let entries = self.entries();
        let entry = entries.get(key)?;

        Some(CachedData {
            data: entry.value.clone(),
            cached_at: entry.created_at,
            is_expired: Instant::now() >= entry.expires_at,
        })
    }

    /// Stores a value using the default TTL
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Stores a value that stays fresh for `ttl`
    ///
    /// A zero TTL is clamped to one millisecond.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let created_at = Instant::now();
        let entry = CacheEntry {
            value,
            created_at,
            expires_at: created_at + ttl.max(MIN_TTL),
        };

        self.entries().insert(key.into(), entry);
    }

    /// Removes one entry, returning whether it existed
    pub fn delete(&self, key: &str) -> bool {
        self.entries().remove(key).is_some()
    }

    /// Removes every entry
    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[derive(Debug, Clone, PartialEq)]
    struct TestData {
        name: String,
        value: i32,
    }

    fn test_data(name: &str, value: i32) -> TestData {
        TestData {
            name: name.to_string(),
            value,
        }
    }

    #[test]
    fn test_get_returns_none_for_missing_key() {
        let cache: TtlCache<TestData> = TtlCache::new();
        assert!(cache.get("nonexistent_key").is_none());
        assert!(cache.read("nonexistent_key").is_none());
    }

    #[test]
    fn test_default_ttl_is_sixty_seconds() {
        let cache: TtlCache<TestData> = TtlCache::new();
        assert_eq!(cache.default_ttl(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_returns_value_before_expiry() {
        let cache = TtlCache::new();
        cache.set("fresh_key", test_data("fresh", 100));

        advance(Duration::from_secs(59)).await;

        assert_eq!(cache.get("fresh_key"), Some(test_data("fresh", 100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_expires_lazily_and_removes_entry() {
        let cache = TtlCache::new();
        cache.set("expired_key", test_data("expired", 0));

        advance(Duration::from_secs(60)).await;

        assert!(cache.get("expired_key").is_none());
        assert!(cache.read("expired_key").is_none(), "get should drop the entry");
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_returns_expired_entry_without_removing_it() {
        let cache = TtlCache::new();
        cache.set_with_ttl("stale_key", test_data("stale", 7), Duration::from_secs(5));

        advance(Duration::from_secs(10)).await;

        let cached = cache.read("stale_key").expect("Should read expired entry");
        assert_eq!(cached.data, test_data("stale", 7));
        assert!(cached.is_expired);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_reports_fresh_entry() {
        let cache = TtlCache::new();
        let before = Instant::now();
        cache.set("key", test_data("fresh", 1));

        let cached = cache.read("key").expect("Should read cache");
        assert!(!cached.is_expired);
        assert!(cached.cached_at >= before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_is_clamped_to_positive_lifetime() {
        let cache = TtlCache::new();
        cache.set_with_ttl("zero", test_data("zero", 0), Duration::ZERO);

        assert!(cache.get("zero").is_some());

        advance(Duration::from_millis(1)).await;
        assert!(cache.get("zero").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_resets_expiry_on_overwrite() {
        let cache = TtlCache::new();
        cache.set("key", test_data("first", 1));

        advance(Duration::from_secs(50)).await;
        cache.set("key", test_data("second", 2));
        advance(Duration::from_secs(50)).await;

        assert_eq!(cache.get("key"), Some(test_data("second", 2)));
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = TtlCache::new();
        cache.set("a", 1);
        cache.set("b", 2);

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("b").is_none());
    }
}
