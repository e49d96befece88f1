//! Filesystem trait and implementations.
//!
//! This module defines the [`FileSystem`] trait, the raw I/O seam underneath
//! [`RetryingFileOps`](crate::RetryingFileOps). Implementations perform a
//! single attempt and report what happened; validation, timeouts and retries
//! are layered on top.

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::local::LocalFileSystem;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::{Fault, MockFileSystem};
use crate::error::Result;
use crate::models::{AccessMode, FileStat};
use async_trait::async_trait;
use std::path::Path;
use tokio::io::AsyncRead;

/// Owned async reader returned by [`FileSystem::reader`]. Dropping it releases
/// the underlying handle.
pub type BoxAsyncRead = Box<dyn AsyncRead + Send + Unpin + 'static>;

/// Unified interface for raw filesystem access.
///
/// # Path Handling
/// Every path is absolute and has already been through
/// [`validate_path`](crate::validate_path). Implementations must not re-resolve
/// paths against any root of their own.
///
/// # Errors
/// Implementations report missing files as
/// [`NotFound`](crate::error::ErrorKind::NotFound) and denied access as
/// [`PermissionDenied`](crate::error::ErrorKind::PermissionDenied); everything
/// else is [`Io`](crate::error::ErrorKind::Io) carrying the original error so
/// the retry layer can classify it.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use membank_storage::{FileSystem, error::Result};
///
/// async fn size_of(fs: &dyn FileSystem, path: &Path) -> Result<u64> {
///     if fs.exists(path).await? {
///         Ok(fs.stat(path).await?.size)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Name of the filesystem implementation (used for logging only).
    fn name(&self) -> &str;

    /// Check if a file or directory exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read a whole file as UTF-8 text.
    async fn read(&self, path: &Path) -> Result<String>;

    /// Open a file for sequential streaming reads.
    async fn reader(&self, path: &Path) -> Result<BoxAsyncRead>;

    /// Create or overwrite a file.
    ///
    /// # Notes
    /// - Implementations should create parent directories as needed.
    /// - Readers must never observe a partially written file.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Create a directory and all of its missing parents. Succeeds if the
    /// directory already exists.
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Get metadata without reading contents.
    async fn stat(&self, path: &Path) -> Result<FileStat>;

    /// Succeeds if the current process may access `path` in `mode`.
    async fn access(&self, path: &Path, mode: AccessMode) -> Result<()>;
}
