use std::time::{Duration, Instant};
use time::OffsetDateTime;

/// A snapshot of one cached file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// File contents as last read from (or written to) disk.
    pub content: String,
    /// Modification time of the source file when the content was cached.
    pub modified: OffsetDateTime,
    /// When the content was stored; the entry's age is measured from here.
    pub stored_at: Instant,
    /// Last successful lookup or store.
    pub last_accessed: Instant,
    /// Number of hits served from this entry since it was stored.
    pub access_count: u64,
}
impl CacheEntry {
    pub(crate) fn new(content: String, modified: OffsetDateTime) -> Self {
        let now = Instant::now();
        Self { content, modified, stored_at: now, last_accessed: now, access_count: 0 }
    }

    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    /// An entry is only usable while it still describes the file on disk and
    /// hasn't outlived the configured maximum age.
    pub(crate) fn is_fresh(&self, modified: OffsetDateTime, max_age: Duration) -> bool {
        self.modified == modified && self.age() < max_age
    }
}
