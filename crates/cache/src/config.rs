use std::time::Duration;

/// Default maximum number of cached files.
pub const DEFAULT_CAPACITY: usize = 100;
/// Default maximum entry age (one hour).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Tunables for a [`BoundedCache`](crate::BoundedCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries held at once. Zero is treated as one.
    pub capacity: usize,
    /// Entries older than this (measured from when they were stored) are
    /// treated as stale.
    pub max_age: Duration,
    /// When disabled, hit/miss/eviction counters are not accumulated.
    pub metrics_enabled: bool,
}
impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_CAPACITY, max_age: DEFAULT_MAX_AGE, metrics_enabled: true }
    }
}
impl CacheConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }
}
