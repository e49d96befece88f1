use serde::Serialize;
use time::OffsetDateTime;

/// Accumulated cache counters, as reported by
/// [`BoundedCache::stats`](crate::BoundedCache::stats).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatistics {
    /// Lookups answered from a fresh entry.
    pub hits: u64,
    /// Lookups that found nothing usable (absent or stale).
    pub misses: u64,
    /// Entries removed for capacity or staleness.
    pub evictions: u64,
    /// Stores that replaced an existing entry.
    pub reloads: u64,
    /// Distinct files currently tracked, adjusted on store/evict/invalidate.
    pub total_files: u64,
    /// `hits / (hits + misses)`, or zero when nothing has been looked up.
    pub hit_rate: f64,
    pub capacity: usize,
    pub current_size: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub last_reset: OffsetDateTime,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Counters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub reloads: u64,
    pub total_files: u64,
    pub last_reset: OffsetDateTime,
}
impl Default for Counters {
    fn default() -> Self {
        Self { hits: 0, misses: 0, evictions: 0, reloads: 0, total_files: 0, last_reset: OffsetDateTime::now_utc() }
    }
}
impl Counters {
    pub fn hit_rate(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            lookups => self.hits as f64 / lookups as f64,
        }
    }

    /// Zero the accumulated counters. The population counter is re-seeded from
    /// the number of entries still held, because resetting statistics never
    /// touches the entries themselves.
    pub fn reset(&mut self, current_size: usize) {
        *self = Self { total_files: current_size as u64, ..Self::default() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_without_lookups_is_zero() {
        assert_eq!(Counters::default().hit_rate(), 0.0);
    }

    #[test]
    fn hit_rate_ratio() {
        let counters = Counters { hits: 3, misses: 1, ..Counters::default() };
        assert_eq!(counters.hit_rate(), 0.75);
    }

    #[test]
    fn reset_keeps_population() {
        let mut counters = Counters { hits: 9, misses: 4, evictions: 2, reloads: 1, ..Counters::default() };
        counters.reset(7);
        assert_eq!((counters.hits, counters.misses, counters.evictions, counters.reloads), (0, 0, 0, 0));
        assert_eq!(counters.total_files, 7);
    }
}
