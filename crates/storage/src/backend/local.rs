//! Local filesystem backend.
//!
//! Accesses files through `tokio::fs` for async I/O. Writes run as a single
//! blocking task so a write abandoned by its caller still finishes or cleans up.

use crate::backend::BoxAsyncRead;
use crate::error::{ErrorKind, Result};
use crate::models::{AccessMode, FileKind, FileStat};
use crate::FileSystem;
use async_trait::async_trait;
use std::fs::Metadata;
use std::io::Error as IoError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;
use tokio::fs;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Local filesystem backend.
///
/// # Examples
///
/// ```no_run
/// use membank_storage::{FileSystem, LocalFileSystem};
/// use std::path::Path;
///
/// # async fn example() -> membank_storage::error::Result<()> {
/// let fs = LocalFileSystem::default();
/// fs.write(Path::new("/srv/bank/core/projectbrief.md"), b"# Project Brief").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalFileSystem {
    name: String,
}
impl LocalFileSystem {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn file_stat(path: &Path, metadata: Metadata) -> Result<FileStat> {
        let modified: OffsetDateTime = metadata.modified().map_err(|e| ErrorKind::from_io(e, path))?.into();
        let kind = if metadata.is_file() {
            FileKind::File
        } else if metadata.is_dir() {
            FileKind::Directory
        } else {
            FileKind::Other
        };
        let size = match kind {
            FileKind::File => metadata.len(),
            _ => 0,
        };
        Ok(FileStat::new(path, size, modified, kind))
    }

    /// Sibling path used to stage a write before renaming it into place.
    fn staging_path(path: &Path) -> PathBuf {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        let unique = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        path.with_file_name(format!(".{name}.{}.{unique}.tmp", std::process::id()))
    }

    /// Stage then rename, so concurrent readers see either the old or the new
    /// contents and never a truncated file. The staging file never survives a
    /// failed write.
    fn write_staged(path: &Path, data: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let staging = Self::staging_path(path);
        let result = std::fs::write(&staging, data).and_then(|()| std::fs::rename(&staging, path));
        if result.is_err() {
            let _ = std::fs::remove_file(&staging);
        }
        result
    }
}
impl Default for LocalFileSystem {
    fn default() -> Self {
        Self::new("local")
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await.map_err(|e| ErrorKind::from_io(e, path))?)
    }

    async fn read(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path).await.map_err(|e| ErrorKind::from_io(e, path))?)
    }

    async fn reader(&self, path: &Path) -> Result<BoxAsyncRead> {
        let file = fs::File::open(path).await.map_err(|e| ErrorKind::from_io(e, path))?;
        Ok(Box::new(file))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        // The blocking task outlives a dropped future, so it owns its cleanup.
        let (target, data) = (path.to_path_buf(), data.to_vec());
        let written = tokio::task::spawn_blocking(move || Self::write_staged(&target, &data))
            .await
            .map_err(|e| ErrorKind::from_io(IoError::other(e), path))?;
        Ok(written.map_err(|e| ErrorKind::from_io(e, path))?)
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        Ok(fs::create_dir_all(path).await.map_err(|e| ErrorKind::from_io(e, path))?)
    }

    async fn stat(&self, path: &Path) -> Result<FileStat> {
        let metadata = fs::metadata(path).await.map_err(|e| ErrorKind::from_io(e, path))?;
        Self::file_stat(path, metadata)
    }

    async fn access(&self, path: &Path, mode: AccessMode) -> Result<()> {
        let metadata = fs::metadata(path).await.map_err(|e| ErrorKind::from_io(e, path))?;
        if metadata.is_dir() {
            if mode.writable() && metadata.permissions().readonly() {
                exn::bail!(ErrorKind::PermissionDenied(path.to_path_buf()));
            }
            return Ok(());
        }
        // Opening is the only portable way to ask the OS what it would allow.
        fs::OpenOptions::new()
            .read(mode.readable())
            .write(mode.writable())
            .open(path)
            .await
            .map_err(|e| ErrorKind::from_io(e, path))?;
        Ok(())
    }
}
