//! In-memory filesystem for testing.

use crate::backend::BoxAsyncRead;
use crate::error::{ErrorKind, Result};
use crate::models::{AccessMode, FileKind, FileStat};
use crate::FileSystem;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::io::{Cursor, Error as IoError, ErrorKind as IoErrorKind};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::RwLock;

/// A failure injected into the next call made against a [`MockFileSystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail with an I/O error of this kind.
    Fail(IoErrorKind),
    /// Fail with a raw OS error code (`EMFILE`, `EBUSY`, ...).
    Os(i32),
    /// Never complete; only a timeout gets the caller out.
    Stall,
    /// Let the call through untouched; useful to aim a later fault at a
    /// specific call.
    Pass,
    /// Only honoured by [`reader`](FileSystem::reader): the stream ends after
    /// this many bytes regardless of the file's size.
    Truncate(usize),
    /// Only honoured by [`reader`](FileSystem::reader): the stream delivers
    /// this many bytes, then hangs on the next read.
    StallAfter(usize),
}

/// Reader that never becomes ready.
struct Stalled;
impl AsyncRead for Stalled {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        Poll::Pending
    }
}

struct MockFile {
    modified: OffsetDateTime,
    data: Vec<u8>,
}

/// In-memory filesystem for testing.
///
/// Files live in a `HashMap` behind a [`RwLock`], so all trait methods can
/// operate on `&self` without external synchronisation. Modification times
/// come from a counter that ticks once per write, so two writes never share
/// an mtime. Every trait call first consumes one queued [`Fault`], if any,
/// and increments [`calls`](Self::calls).
pub struct MockFileSystem {
    name: String,
    files: RwLock<HashMap<PathBuf, MockFile>>,
    dirs: RwLock<BTreeSet<PathBuf>>,
    denied: Mutex<HashSet<PathBuf>>,
    faults: Mutex<VecDeque<Fault>>,
    calls: AtomicUsize,
    clock: AtomicI64,
}

impl MockFileSystem {
    /// Create a mock filesystem pre-populated with files. Parent directories
    /// are created implicitly.
    ///
    /// Panics if any path is relative. If test setup is wrong, then test
    /// should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let clock = AtomicI64::new(1);
        let mut files_map = HashMap::new();
        let mut dirs_set = BTreeSet::new();
        for (path, data) in files {
            let path = path.into();
            if !path.is_absolute() {
                // The panic here is DELIBERATE. MockFileSystem is intended to
                // be used in tests; panics are expected. There is no error result.
                panic!("MockFileSystem::with_files: relative path {}", path.display());
            }
            Self::insert_ancestors(&mut dirs_set, &path);
            files_map.insert(path, MockFile { modified: Self::tick_clock(&clock), data: data.into() });
        }
        Self {
            name: "mock".to_string(),
            files: RwLock::new(files_map),
            dirs: RwLock::new(dirs_set),
            denied: Mutex::default(),
            faults: Mutex::default(),
            calls: AtomicUsize::new(0),
            clock,
        }
    }

    /// Change the name of the mock filesystem.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Queue `fault` for each of the next `times` calls.
    pub fn inject(&self, times: usize, fault: Fault) {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        faults.extend(std::iter::repeat_n(fault, times));
    }

    /// Fail the next `times` calls with an I/O error of `kind`.
    pub fn fail_next(&self, times: usize, kind: IoErrorKind) {
        self.inject(times, Fault::Fail(kind));
    }

    /// Make the next `times` calls hang forever.
    pub fn stall_next(&self, times: usize) {
        self.inject(times, Fault::Stall);
    }

    /// Number of trait calls made so far, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Deny every kind of access to `path` from now on.
    pub fn deny(&self, path: impl Into<PathBuf>) {
        self.denied.lock().unwrap_or_else(PoisonError::into_inner).insert(path.into());
    }

    /// Remove a file behind the back of any cache, as another process would.
    pub async fn remove(&self, path: impl AsRef<Path>) -> bool {
        self.files.write().await.remove(path.as_ref()).is_some()
    }

    /// Bump a file's modification time without changing its contents.
    pub async fn touch(&self, path: impl AsRef<Path>) -> bool {
        let modified = self.tick();
        match self.files.write().await.get_mut(path.as_ref()) {
            Some(file) => {
                file.modified = modified;
                true
            },
            None => false,
        }
    }

    fn tick(&self) -> OffsetDateTime {
        Self::tick_clock(&self.clock)
    }

    fn tick_clock(clock: &AtomicI64) -> OffsetDateTime {
        let seconds = clock.fetch_add(1, Ordering::SeqCst);
        OffsetDateTime::UNIX_EPOCH + Duration::from_secs(seconds.unsigned_abs())
    }

    fn insert_ancestors(dirs: &mut BTreeSet<PathBuf>, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            dirs.insert(ancestor.to_path_buf());
        }
    }

    /// Record the call and apply the next queued fault. Faults that only
    /// [`reader`](FileSystem::reader) understands are handed back.
    async fn begin(&self, path: &Path) -> Result<Option<Fault>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fault = self.faults.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        match fault {
            None | Some(Fault::Pass) => {},
            Some(Fault::Fail(kind)) => exn::bail!(ErrorKind::from_io(IoError::from(kind), path)),
            Some(Fault::Os(code)) => exn::bail!(ErrorKind::from_io(IoError::from_raw_os_error(code), path)),
            Some(Fault::Stall) => std::future::pending::<()>().await,
            Some(fault @ (Fault::Truncate(_) | Fault::StallAfter(_))) => return Ok(Some(fault)),
        }
        if self.denied.lock().unwrap_or_else(PoisonError::into_inner).contains(path) {
            exn::bail!(ErrorKind::PermissionDenied(path.to_path_buf()));
        }
        Ok(None)
    }

    async fn contents(&self, path: &Path) -> Result<Vec<u8>> {
        let files = self.files.read().await;
        let file = files.get(path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.to_path_buf())))?;
        Ok(file.data.clone())
    }
}
impl Default for MockFileSystem {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl FileSystem for MockFileSystem {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.begin(path).await?;
        Ok(self.files.read().await.contains_key(path) || self.dirs.read().await.contains(path))
    }

    async fn read(&self, path: &Path) -> Result<String> {
        self.begin(path).await?;
        let data = self.contents(path).await?;
        Ok(String::from_utf8(data).map_err(|e| ErrorKind::Io(IoError::new(IoErrorKind::InvalidData, e)))?)
    }

    async fn reader(&self, path: &Path) -> Result<BoxAsyncRead> {
        let fault = self.begin(path).await?;
        let mut data = self.contents(path).await?;
        match fault {
            Some(Fault::Truncate(len)) => {
                data.truncate(len);
                Ok(Box::new(Cursor::new(data)))
            },
            Some(Fault::StallAfter(len)) => {
                data.truncate(len);
                Ok(Box::new(Cursor::new(data).chain(Stalled)))
            },
            _ => Ok(Box::new(Cursor::new(data))),
        }
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.begin(path).await?;
        if self.dirs.read().await.contains(path) {
            exn::bail!(ErrorKind::Io(IoError::from(IoErrorKind::IsADirectory)));
        }
        Self::insert_ancestors(&mut *self.dirs.write().await, path);
        let file = MockFile { modified: self.tick(), data: data.to_vec() };
        self.files.write().await.insert(path.to_path_buf(), file);
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.begin(path).await?;
        if self.files.read().await.contains_key(path) {
            exn::bail!(ErrorKind::Io(IoError::from(IoErrorKind::AlreadyExists)));
        }
        let mut dirs = self.dirs.write().await;
        Self::insert_ancestors(&mut dirs, path);
        dirs.insert(path.to_path_buf());
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileStat> {
        self.begin(path).await?;
        if let Some(file) = self.files.read().await.get(path) {
            return Ok(FileStat::new(path, file.data.len() as u64, file.modified, FileKind::File));
        }
        match self.dirs.read().await.contains(path) {
            true => Ok(FileStat::new(path, 0, OffsetDateTime::UNIX_EPOCH, FileKind::Directory)),
            false => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
        }
    }

    async fn access(&self, path: &Path, _mode: AccessMode) -> Result<()> {
        self.begin(path).await?;
        match self.files.read().await.contains_key(path) || self.dirs.read().await.contains(path) {
            true => Ok(()),
            false => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_write_and_read() {
        let fs = MockFileSystem::default();
        fs.write(Path::new("/bank/test.md"), b"hello").await.unwrap();
        assert_eq!(fs.read(Path::new("/bank/test.md")).await.unwrap(), "hello");
        assert!(fs.exists(Path::new("/bank")).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let fs = MockFileSystem::default();
        let err = fs.read(Path::new("/missing.md")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_writes_advance_modified_time() {
        let fs = MockFileSystem::default();
        let path = Path::new("/bank/file.md");
        fs.write(path, b"one").await.unwrap();
        let first = fs.stat(path).await.unwrap().modified;
        fs.write(path, b"one").await.unwrap();
        let second = fs.stat(path).await.unwrap().modified;
        assert!(second > first);
        assert!(fs.touch(path).await);
        assert!(fs.stat(path).await.unwrap().modified > second);
    }

    #[tokio::test]
    async fn test_faults_are_consumed_in_order() {
        let fs = MockFileSystem::with_files([("/bank/a.md", "a")]);
        fs.fail_next(1, IoErrorKind::ResourceBusy);
        fs.inject(1, Fault::Os(24));
        let first = fs.read(Path::new("/bank/a.md")).await.unwrap_err();
        assert!(matches!(&*first, ErrorKind::Io(e) if e.kind() == IoErrorKind::ResourceBusy));
        let second = fs.read(Path::new("/bank/a.md")).await.unwrap_err();
        assert!(matches!(&*second, ErrorKind::Io(e) if e.raw_os_error() == Some(24)));
        assert_eq!(fs.read(Path::new("/bank/a.md")).await.unwrap(), "a");
        assert_eq!(fs.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_never_completes() {
        let fs = MockFileSystem::with_files([("/bank/a.md", "a")]);
        fs.stall_next(1);
        let stalled = tokio::time::timeout(Duration::from_secs(5), fs.read(Path::new("/bank/a.md"))).await;
        assert!(stalled.is_err());
        assert_eq!(fs.read(Path::new("/bank/a.md")).await.unwrap(), "a");
    }

    #[tokio::test]
    async fn test_truncated_reader() {
        let fs = MockFileSystem::with_files([("/bank/a.md", "abcdef")]);
        fs.inject(1, Fault::Truncate(3));
        let mut buffer = String::new();
        fs.reader(Path::new("/bank/a.md")).await.unwrap().read_to_string(&mut buffer).await.unwrap();
        assert_eq!(buffer, "abc");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_stalls_mid_stream() {
        let fs = MockFileSystem::with_files([("/bank/a.md", "abcdef")]);
        fs.inject(1, Fault::StallAfter(2));
        let mut reader = fs.reader(Path::new("/bank/a.md")).await.unwrap();
        let mut head = [0; 2];
        reader.read_exact(&mut head).await.unwrap();
        assert_eq!(&head, b"ab");
        let rest = tokio::time::timeout(Duration::from_secs(1), reader.read_u8()).await;
        assert!(rest.is_err());
    }

    #[tokio::test]
    async fn test_denied_paths() {
        let fs = MockFileSystem::with_files([("/bank/a.md", "a")]);
        fs.deny("/bank/a.md");
        let err = fs.access(Path::new("/bank/a.md"), AccessMode::Read).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_stat_directory() {
        let fs = MockFileSystem::default();
        fs.create_dir_all(Path::new("/bank/core")).await.unwrap();
        assert!(fs.stat(Path::new("/bank/core")).await.unwrap().is_dir());
        assert!(fs.stat(Path::new("/bank")).await.unwrap().is_dir());
    }

    #[test]
    #[should_panic(expected = "relative path")]
    fn test_with_files_panics_on_relative_path() {
        MockFileSystem::with_files([("core/a.md", "bad")]);
    }
}
