use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::stats::{CacheStatistics, Counters};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use time::OffsetDateTime;

/// Capacity- and age-bounded content cache keyed by absolute file path.
///
/// Each key moves through the same lifecycle:
///
/// - **absent** → **fresh** on [`put`](Self::put),
/// - **fresh** → **stale** once the file's modification time changes or the
///   entry outlives [`max_age`](CacheConfig::max_age) (detected lazily, on
///   the next [`get`](Self::get)),
/// - **stale** → **absent** when that `get` evicts it.
///
/// When a new key arrives at capacity, the single least-recently-used entry is
/// evicted first. Recency comes from a monotonically increasing tick that is
/// bumped on every successful `get` and every `put`, so two entries can never
/// tie.
///
/// All state sits behind one mutex that is never held across an `.await`:
/// every check-then-mutate sequence is atomic with respect to other tasks.
///
/// # Examples
///
/// ```
/// use membank_cache::{BoundedCache, CacheConfig};
/// use time::OffsetDateTime;
///
/// let cache = BoundedCache::new(CacheConfig::default().with_capacity(2));
/// let modified = OffsetDateTime::now_utc();
/// cache.put("/bank/core/projectbrief.md", "# Brief", modified);
/// assert_eq!(cache.get("/bank/core/projectbrief.md".as_ref(), modified).as_deref(), Some("# Brief"));
/// // A different modification time means the file changed underneath us.
/// assert_eq!(cache.get("/bank/core/projectbrief.md".as_ref(), OffsetDateTime::UNIX_EPOCH), None);
/// ```
#[derive(Debug)]
pub struct BoundedCache {
    config: CacheConfig,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<PathBuf, Slot>,
    /// Recency tick → key. The first entry is always the least recently used.
    recency: BTreeMap<u64, PathBuf>,
    tick: u64,
    counters: Counters,
}

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    tick: u64,
}

impl State {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Move `path` to the most-recently-used position.
    fn touch(&mut self, path: &Path) {
        let tick = self.next_tick();
        if let Some(slot) = self.entries.get_mut(path) {
            self.recency.remove(&slot.tick);
            slot.tick = tick;
            self.recency.insert(tick, path.to_path_buf());
        }
    }

    fn remove(&mut self, path: &Path) -> Option<CacheEntry> {
        let slot = self.entries.remove(path)?;
        self.recency.remove(&slot.tick);
        Some(slot.entry)
    }

    fn pop_least_recent(&mut self) -> Option<PathBuf> {
        let (_, path) = self.recency.pop_first()?;
        self.entries.remove(&path);
        Some(path)
    }
}

impl Default for BoundedCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl BoundedCache {
    pub fn new(config: CacheConfig) -> Self {
        let config = CacheConfig { capacity: config.capacity.max(1), ..config };
        Self { config, state: Mutex::new(State::default()) }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an entry exists for `path`, fresh or not. Does not count as an
    /// access.
    pub fn contains(&self, path: &Path) -> bool {
        self.state().entries.contains_key(path)
    }

    /// Copy of the entry for `path`, without counting as an access.
    pub fn entry(&self, path: &Path) -> Option<CacheEntry> {
        self.state().entries.get(path).map(|slot| slot.entry.clone())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // Every critical section leaves the state consistent before it can
        // panic, so a poisoned lock is still safe to keep using.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up `path`, given the file's current on-disk modification time.
    ///
    /// Returns the cached content only if the entry's recorded modification
    /// time matches `modified` and the entry is younger than the configured
    /// maximum age. A stale entry is evicted and the lookup reported as a miss.
    pub fn get(&self, path: &Path, modified: OffsetDateTime) -> Option<String> {
        let metrics = self.config.metrics_enabled;
        let mut state = self.state();
        let fresh = match state.entries.get(path) {
            None => {
                if metrics {
                    state.counters.misses += 1;
                }
                return None;
            },
            Some(slot) => slot.entry.is_fresh(modified, self.config.max_age),
        };
        if !fresh {
            state.remove(path);
            if metrics {
                state.counters.misses += 1;
                state.counters.evictions += 1;
                state.counters.total_files = state.counters.total_files.saturating_sub(1);
            }
            tracing::debug!(path = %path.display(), "Evicted stale cache entry");
            return None;
        }
        state.touch(path);
        if metrics {
            state.counters.hits += 1;
        }
        let slot = state.entries.get_mut(path)?;
        slot.entry.access_count += 1;
        slot.entry.last_accessed = Instant::now();
        Some(slot.entry.content.clone())
    }

    /// Store `content` for `path`, recorded against the file's modification
    /// time `modified`.
    ///
    /// Replacing an existing entry counts as a reload. Inserting a new key at
    /// capacity evicts the least-recently-used entry first.
    pub fn put(&self, path: impl Into<PathBuf>, content: impl Into<String>, modified: OffsetDateTime) {
        let path = path.into();
        let metrics = self.config.metrics_enabled;
        let entry = CacheEntry::new(content.into(), modified);
        let mut guard = self.state();
        let state = &mut *guard;
        let tick = state.next_tick();
        if let Some(existing) = state.entries.get_mut(&path) {
            let previous = existing.tick;
            existing.entry = entry;
            existing.tick = tick;
            state.recency.remove(&previous);
            state.recency.insert(tick, path);
            if metrics {
                state.counters.reloads += 1;
            }
            return;
        }
        if state.entries.len() >= self.config.capacity
            && let Some(evicted) = state.pop_least_recent()
        {
            tracing::debug!(path = %evicted.display(), "Evicted least recently used cache entry");
            if metrics {
                state.counters.evictions += 1;
                state.counters.total_files = state.counters.total_files.saturating_sub(1);
            }
        }
        state.recency.insert(tick, path.clone());
        state.entries.insert(path, Slot { entry, tick });
        if metrics {
            state.counters.total_files += 1;
        }
    }

    /// Remove the entry for `path`, or every entry when `path` is `None`.
    ///
    /// Returns how many entries were removed.
    pub fn invalidate(&self, path: Option<&Path>) -> usize {
        let mut state = self.state();
        let removed = match path {
            Some(path) => usize::from(state.remove(path).is_some()),
            None => {
                let count = state.entries.len();
                state.entries.clear();
                state.recency.clear();
                count
            },
        };
        if self.config.metrics_enabled {
            state.counters.total_files = state.counters.total_files.saturating_sub(removed as u64);
        }
        if removed > 0 {
            tracing::debug!(path = ?path, removed, "Invalidated cache");
        }
        removed
    }

    pub fn stats(&self) -> CacheStatistics {
        let state = self.state();
        let counters = state.counters;
        CacheStatistics {
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
            reloads: counters.reloads,
            total_files: counters.total_files,
            hit_rate: counters.hit_rate(),
            capacity: self.config.capacity,
            current_size: state.entries.len(),
            last_reset: counters.last_reset,
        }
    }

    /// Zero the accumulated counters. Entries are left alone.
    pub fn reset_stats(&self) {
        let mut state = self.state();
        let size = state.entries.len();
        state.counters.reset(size);
    }
}
