//! Bounded retry around raw filesystem calls.

use crate::backend::{BoxAsyncRead, FileSystem};
use crate::error::{ErrorKind, Operation, Result};
use crate::models::{AccessMode, FileStat};
use crate::path::validate as validate_path;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// How many times, and how patiently, a failed operation is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Deadline for each individual attempt.
    pub timeout: Duration,
}
impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}
impl RetryPolicy {
    /// Wait before retry number `retry` (zero-based):
    /// `min(base_delay * backoff_factor^retry, max_delay)`.
    ///
    /// ```
    /// use membank_storage::RetryPolicy;
    /// use std::time::Duration;
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.delay(0), Duration::from_millis(100));
    /// assert_eq!(policy.delay(1), Duration::from_millis(200));
    /// assert_eq!(policy.delay(10), Duration::from_secs(5));
    /// ```
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let seconds = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !seconds.is_finite() || seconds >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)
    }
}

/// Validated filesystem access with a per-attempt timeout and bounded
/// exponential-backoff retry of transient failures.
///
/// Paths may be relative to the root or, when absolute, must lie inside it.
/// Validation failures surface immediately and are never retried.
///
/// # Examples
///
/// ```no_run
/// use membank_storage::{LocalFileSystem, RetryPolicy, RetryingFileOps};
/// use std::sync::Arc;
///
/// # async fn example() -> membank_storage::error::Result<()> {
/// let ops = RetryingFileOps::new(Arc::new(LocalFileSystem::default()), "/srv/bank", RetryPolicy::default())?;
/// ops.write("core/projectbrief.md", "# Project Brief").await?;
/// let brief = ops.read("core/projectbrief.md").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RetryingFileOps {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    policy: RetryPolicy,
}

impl RetryingFileOps {
    /// Resolves `root` once with [`resolve_root`](crate::resolve_root).
    pub fn new(fs: Arc<dyn FileSystem>, root: impl AsRef<Path>, policy: RetryPolicy) -> Result<Self> {
        let root = crate::path::resolve_root(root)?;
        Ok(Self { fs, root, policy })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn filesystem(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Validate `path` against the root, returning the absolute path.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        validate_path(path, &self.root, true)
    }

    pub async fn read(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = self.resolve(path)?;
        self.run(Operation::Read, &path, || self.fs.read(&path)).await
    }

    pub async fn write(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<()> {
        let path = self.resolve(path)?;
        let contents = contents.as_ref();
        self.run(Operation::Write, &path, || self.fs.write(&path, contents)).await
    }

    pub async fn create_dir(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = self.resolve(path)?;
        self.run(Operation::CreateDir, &path, || self.fs.create_dir_all(&path)).await
    }

    pub async fn stat(&self, path: impl AsRef<Path>) -> Result<FileStat> {
        let path = self.resolve(path)?;
        self.run(Operation::Stat, &path, || self.fs.stat(&path)).await
    }

    pub async fn access(&self, path: impl AsRef<Path>, mode: AccessMode) -> Result<()> {
        let path = self.resolve(path)?;
        self.run(Operation::Access, &path, || self.fs.access(&path, mode)).await
    }

    /// Existence checks report "no" rather than failing on a missing file, so
    /// only genuine I/O trouble is retried.
    pub async fn exists(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = self.resolve(path)?;
        self.run(Operation::Exists, &path, || self.fs.exists(&path)).await
    }

    pub async fn reader(&self, path: impl AsRef<Path>) -> Result<BoxAsyncRead> {
        let path = self.resolve(path)?;
        self.run(Operation::Open, &path, || self.fs.reader(&path)).await
    }

    /// Drive `attempt` until it succeeds, fails permanently, or runs out of
    /// retries. Each attempt races the policy timeout; the losing future is
    /// dropped, releasing whatever it held.
    async fn run<T, F, Fut>(&self, operation: Operation, path: &Path, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            tracing::debug!(%operation, path = %path.display(), attempt = attempts, fs = self.fs.name(), "Attempting");
            let error = match tokio::time::timeout(self.policy.timeout, attempt()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) => error,
                Err(_elapsed) => exn::Exn::from(ErrorKind::Timeout {
                    operation,
                    path: path.to_path_buf(),
                    after: self.policy.timeout,
                }),
            };
            let retry = attempts - 1;
            if !error.is_retryable() || retry >= self.policy.max_retries {
                if error.is_retryable() {
                    tracing::warn!(%operation, path = %path.display(), attempts, error = %*error, "Retries exhausted");
                }
                return Err(error.raise(ErrorKind::OperationFailed { operation, path: path.to_path_buf(), attempts }));
            }
            let delay = self.policy.delay(retry);
            tracing::warn!(
                %operation,
                path = %path.display(),
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %*error,
                "Transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
