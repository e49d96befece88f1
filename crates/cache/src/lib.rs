//! In-memory content cache for memory bank documents.
//!
//! The cache is not the source of truth; the files on disk are. Every lookup
//! is checked against the file's current modification time, so an entry that
//! no longer matches what's on disk is dropped rather than served. If the
//! whole cache is thrown away, the next round of reads simply repopulates it.
//!
//! # Architecture
//! - **[`BoundedCache`]**: the store itself. Capacity-bounded with
//!   least-recently-used eviction and a maximum entry age. Internally
//!   synchronized, so it can be shared behind an [`Arc`](std::sync::Arc)
//!   without handing anyone its internals.
//! - **[`CacheEntry`]**: a snapshot of one cached file.
//! - **[`CacheStatistics`]**: accumulated hit/miss/eviction counters.

mod bounded;
mod config;
mod entry;
mod stats;

pub use crate::bounded::BoundedCache;
pub use crate::config::CacheConfig;
pub use crate::entry::CacheEntry;
pub use crate::stats::CacheStatistics;
