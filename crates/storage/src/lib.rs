//! Resilient file access for the memory bank.
//!
//! Layers, from the bottom up:
//! - [`validate_path`] pins every caller-supplied path inside the bank root,
//! - a [`FileSystem`] performs single raw attempts,
//! - [`RetryingFileOps`] races each attempt against a timeout and retries
//!   transient failures with capped exponential backoff,
//! - [`StreamingReader`] picks between a cached single-shot read and a paced,
//!   chunked read based on file size.

pub mod backend;
pub mod error;
mod lock;
mod models;
mod path;
mod retry;
mod stream;

#[cfg(any(test, feature = "mock"))]
pub use crate::backend::{Fault, MockFileSystem};
pub use crate::backend::{BoxAsyncRead, FileSystem, LocalFileSystem};
pub use crate::lock::PathLocks;
pub use crate::models::{AccessMode, FileKind, FileStat};
pub use crate::path::{resolve_root, validate as validate_path};
pub use crate::retry::{RetryPolicy, RetryingFileOps};
pub use crate::stream::{
    BACKPRESSURE_INTERVAL, ProgressFn, ReadOptions, ReadOutcome, StreamingPolicy, StreamingReader, StreamingStatistics,
};
use std::sync::Arc;

pub type FileSystemHandle = Arc<dyn FileSystem>;

/// Default tunables, re-exported for configuration layers.
pub mod defaults {
    pub use crate::retry::{
        DEFAULT_BACKOFF_FACTOR, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES, DEFAULT_OPERATION_TIMEOUT,
    };
    pub use crate::stream::{DEFAULT_CHUNK_SIZE, DEFAULT_SIZE_THRESHOLD, DEFAULT_STREAMING_TIMEOUT};
}
