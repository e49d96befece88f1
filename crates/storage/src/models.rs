//! Storage models.

use std::path::PathBuf;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    /// Sockets, devices, dangling symlinks and the like.
    Other,
}

/// File metadata returned by [`FileSystem::stat`](crate::FileSystem::stat).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// Absolute path that was inspected
    pub path: PathBuf,
    /// File size in bytes (zero for directories)
    pub size: u64,
    /// Last modified timestamp, used as the cache freshness key
    pub modified: OffsetDateTime,
    pub kind: FileKind,
}
impl FileStat {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime, kind: FileKind) -> Self {
        Self { path: path.into(), size, modified, kind }
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

/// Permission checked by [`FileSystem::access`](crate::FileSystem::access).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}
impl AccessMode {
    pub fn readable(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}
