//! Size-based choice between a single-shot read and a chunked, streamed read.

use crate::backend::BoxAsyncRead;
use crate::error::{ErrorKind, Result};
use crate::models::FileStat;
use crate::retry::RetryingFileOps;
use async_stream::try_stream;
use exn::ResultExt;
use futures::{Stream, StreamExt};
use membank_asyncutils::PacedExt;
use membank_cache::BoundedCache;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tracing::instrument;

pub const DEFAULT_SIZE_THRESHOLD: u64 = 1024 * 1024;
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
pub const DEFAULT_STREAMING_TIMEOUT: Duration = Duration::from_secs(30);
/// Streamed reads yield to the scheduler after this many chunks.
pub const BACKPRESSURE_INTERVAL: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingPolicy {
    /// Files of at least this many bytes are streamed.
    pub size_threshold: u64,
    pub chunk_size: usize,
    /// Deadline for a whole streamed read.
    pub timeout: Duration,
    pub progress_enabled: bool,
}
impl Default for StreamingPolicy {
    fn default() -> Self {
        Self {
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: DEFAULT_STREAMING_TIMEOUT,
            progress_enabled: true,
        }
    }
}
impl StreamingPolicy {
    pub fn should_stream(&self, size: u64) -> bool {
        size >= self.size_threshold
    }
}

/// Progress callback, called with `(bytes_read, total_bytes)` after each chunk.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Per-call options for [`StreamingReader::read_file`].
#[derive(Clone, Default)]
pub struct ReadOptions {
    progress: Option<ProgressFn>,
    timeout: Option<Duration>,
}
impl ReadOptions {
    pub fn with_progress(mut self, progress: impl Fn(u64, u64) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Override the policy's streaming timeout for this call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    pub content: String,
    pub was_streamed: bool,
    pub duration: Duration,
    pub bytes_read: u64,
    /// Zero for normal reads.
    pub chunks_processed: u64,
    /// Times the chunk stream yielded to the runtime. Zero for normal reads.
    pub backpressure_pauses: u64,
}

struct Collected {
    content: String,
    chunks: u64,
    pauses: u64,
}

/// Running statistics over successful reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingStatistics {
    pub total_operations: u64,
    pub streamed_operations: u64,
    pub total_bytes_read: u64,
    pub average_streamed_ms: f64,
    pub average_normal_ms: f64,
    pub largest_streamed_file: u64,
}
impl StreamingStatistics {
    fn record(&mut self, outcome: &ReadOutcome) {
        let millis = outcome.duration.as_secs_f64() * 1000.0;
        self.total_operations += 1;
        self.total_bytes_read += outcome.bytes_read;
        if outcome.was_streamed {
            self.streamed_operations += 1;
            self.average_streamed_ms += (millis - self.average_streamed_ms) / self.streamed_operations as f64;
            self.largest_streamed_file = self.largest_streamed_file.max(outcome.bytes_read);
        } else {
            let normal = self.total_operations - self.streamed_operations;
            self.average_normal_ms += (millis - self.average_normal_ms) / normal as f64;
        }
    }
}

/// Reads files either in one go (through the cache) or as a paced sequence of
/// chunks, depending on their size on disk.
///
/// Only normal reads touch the cache: streamed files are by definition too
/// large to be worth holding in memory twice.
pub struct StreamingReader {
    ops: RetryingFileOps,
    cache: Arc<BoundedCache>,
    policy: StreamingPolicy,
    stats: Mutex<StreamingStatistics>,
}

impl StreamingReader {
    pub fn new(ops: RetryingFileOps, cache: Arc<BoundedCache>, policy: StreamingPolicy) -> Self {
        Self { ops, cache, policy, stats: Mutex::default() }
    }

    pub fn policy(&self) -> &StreamingPolicy {
        &self.policy
    }

    pub fn ops(&self) -> &RetryingFileOps {
        &self.ops
    }

    /// Read `path`, streaming it when it is at least
    /// [`size_threshold`](StreamingPolicy::size_threshold) bytes.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn read_file(&self, path: impl AsRef<Path>, options: ReadOptions) -> Result<ReadOutcome> {
        let started = Instant::now();
        let path = self.ops.resolve(path)?;
        let stat = self.ops.stat(&path).await.or_raise(|| ErrorKind::Stat(path.clone()))?;

        let outcome = if self.policy.should_stream(stat.size) {
            let Collected { content, chunks, pauses } = self.read_streamed(&stat, &options).await?;
            ReadOutcome {
                bytes_read: content.len() as u64,
                content,
                was_streamed: true,
                duration: started.elapsed(),
                chunks_processed: chunks,
                backpressure_pauses: pauses,
            }
        } else {
            let content = self.read_normal(&stat).await.or_raise(|| ErrorKind::NormalRead(path.clone()))?;
            ReadOutcome {
                bytes_read: content.len() as u64,
                content,
                was_streamed: false,
                duration: started.elapsed(),
                chunks_processed: 0,
                backpressure_pauses: 0,
            }
        };
        tracing::debug!(
            streamed = outcome.was_streamed,
            bytes = outcome.bytes_read,
            chunks = outcome.chunks_processed,
            pauses = outcome.backpressure_pauses,
            elapsed_ms = outcome.duration.as_millis() as u64,
            "Read file"
        );
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).record(&outcome);
        Ok(outcome)
    }

    /// Whether [`read_file`](Self::read_file) would stream `path` right now.
    pub async fn would_stream_file(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = self.ops.resolve(path)?;
        let stat = self.ops.stat(&path).await.or_raise(|| ErrorKind::Stat(path.clone()))?;
        Ok(self.policy.should_stream(stat.size))
    }

    pub fn stats(&self) -> StreamingStatistics {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner) = StreamingStatistics::default();
    }

    async fn read_normal(&self, stat: &FileStat) -> Result<String> {
        if let Some(content) = self.cache.get(&stat.path, stat.modified) {
            return Ok(content);
        }
        let content = self.ops.read(&stat.path).await?;
        self.cache.put(&stat.path, content.clone(), stat.modified);
        Ok(content)
    }

    async fn read_streamed(&self, stat: &FileStat, options: &ReadOptions) -> Result<Collected> {
        let timeout = options.timeout.unwrap_or(self.policy.timeout);
        // Dropping the losing future closes the reader, exactly once.
        match tokio::time::timeout(timeout, self.collect_chunks(stat, options)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Streaming read timed out");
                exn::bail!(ErrorKind::StreamingTimeout(stat.path.clone()))
            },
        }
    }

    async fn collect_chunks(&self, stat: &FileStat, options: &ReadOptions) -> Result<Collected> {
        let path = &stat.path;
        let reader = self.ops.reader(path).await.or_raise(|| ErrorKind::StreamingRead(path.clone()))?;
        let progress = options.progress.as_ref().filter(|_| self.policy.progress_enabled);

        let mut chunks = std::pin::pin!(chunked(reader, self.policy.chunk_size).paced(BACKPRESSURE_INTERVAL));
        let mut buffer = Vec::with_capacity(usize::try_from(stat.size).unwrap_or(0));
        let mut chunks_processed = 0;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.or_raise(|| ErrorKind::StreamingRead(path.clone()))?;
            buffer.extend_from_slice(&chunk);
            chunks_processed += 1;
            if let Some(progress) = progress {
                progress(buffer.len() as u64, stat.size);
            }
        }

        let received = buffer.len() as u64;
        if received < stat.size {
            exn::bail!(ErrorKind::StreamClosedPrematurely { path: path.clone(), expected: stat.size, received });
        }
        let content = String::from_utf8(buffer).or_raise(|| ErrorKind::StreamingParse(path.clone()))?;
        Ok(Collected { content, chunks: chunks_processed, pauses: chunks.pauses() as u64 })
    }
}

/// Split a reader into chunks of exactly `size` bytes (the last may be short).
fn chunked(mut reader: BoxAsyncRead, size: usize) -> impl Stream<Item = std::io::Result<Vec<u8>>> {
    let size = size.max(1);
    try_stream! {
        loop {
            let mut chunk = Vec::with_capacity(size);
            let read = (&mut reader).take(size as u64).read_to_end(&mut chunk).await?;
            if read == 0 {
                break;
            }
            yield chunk;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Fault, FileSystem, MockFileSystem};
    use crate::retry::RetryPolicy;
    use membank_cache::CacheConfig;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicU64, Ordering};

    const MIB: usize = 1024 * 1024;

    fn reader_over(fs: &Arc<MockFileSystem>, policy: StreamingPolicy) -> (StreamingReader, Arc<BoundedCache>) {
        let ops = RetryingFileOps::new(Arc::clone(fs) as Arc<dyn FileSystem>, "/bank", RetryPolicy::default()).unwrap();
        let cache = Arc::new(BoundedCache::new(CacheConfig::default()));
        (StreamingReader::new(ops, Arc::clone(&cache), policy), cache)
    }

    #[tokio::test]
    async fn small_files_are_read_normally_and_cached() {
        let fs = Arc::new(MockFileSystem::with_files([("/bank/core/projectbrief.md", "# Brief")]));
        let (reader, cache) = reader_over(&fs, StreamingPolicy::default());

        let outcome = reader.read_file("core/projectbrief.md", ReadOptions::default()).await.unwrap();
        assert_eq!(outcome.content, "# Brief");
        assert!(!outcome.was_streamed);
        assert_eq!(outcome.chunks_processed, 0);
        assert!(cache.contains(Path::new("/bank/core/projectbrief.md")));

        // Second read is served from the cache: stat only, no read.
        let calls = fs.calls();
        reader.read_file("core/projectbrief.md", ReadOptions::default()).await.unwrap();
        assert_eq!(fs.calls(), calls + 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn modified_files_bypass_the_cache() {
        let fs = Arc::new(MockFileSystem::with_files([("/bank/a.md", "one")]));
        let (reader, cache) = reader_over(&fs, StreamingPolicy::default());
        reader.read_file("a.md", ReadOptions::default()).await.unwrap();
        fs.write(Path::new("/bank/a.md"), b"two").await.unwrap();

        let outcome = reader.read_file("a.md", ReadOptions::default()).await.unwrap();
        assert_eq!(outcome.content, "two");
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.reloads), (0, 2, 0));
    }

    #[tokio::test]
    async fn large_file_is_streamed_in_chunks() {
        let content = "x".repeat(2 * MIB);
        let fs = Arc::new(MockFileSystem::with_files([("/bank/big.md", content.clone())]));
        let (reader, cache) = reader_over(&fs, StreamingPolicy::default());

        let progress_calls = Arc::new(AtomicU64::new(0));
        let last_progress = Arc::new(AtomicU64::new(0));
        let options = ReadOptions::default().with_progress({
            let (calls, last) = (Arc::clone(&progress_calls), Arc::clone(&last_progress));
            move |read, total| {
                assert_eq!(total, (2 * MIB) as u64);
                calls.fetch_add(1, Ordering::SeqCst);
                last.store(read, Ordering::SeqCst);
            }
        });

        let outcome = reader.read_file("big.md", options).await.unwrap();
        assert!(outcome.was_streamed);
        assert_eq!(outcome.chunks_processed, 32);
        assert_eq!(outcome.bytes_read, (2 * MIB) as u64);
        assert_eq!(outcome.content, content);
        assert_eq!(progress_calls.load(Ordering::SeqCst), 32);
        assert_eq!(last_progress.load(Ordering::SeqCst), (2 * MIB) as u64);
        assert_eq!(outcome.backpressure_pauses, 3);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn streamed_read_yields_to_other_work() {
        let fs = Arc::new(MockFileSystem::with_files([("/bank/big.md", "x".repeat(2 * MIB))]));
        let (reader, _) = reader_over(&fs, StreamingPolicy::default());

        // Every mock read is ready immediately, so the ticker only runs when
        // the stream pauses.
        let done = Cell::new(false);
        let ticks = Cell::new(0);
        let (outcome, ()) = tokio::join!(
            async {
                let outcome = reader.read_file("big.md", ReadOptions::default()).await.unwrap();
                done.set(true);
                outcome
            },
            async {
                while !done.get() {
                    ticks.set(ticks.get() + 1);
                    tokio::task::yield_now().await;
                }
            }
        );
        assert_eq!(outcome.chunks_processed, 32);
        assert_eq!(outcome.backpressure_pauses, 3);
        assert!(ticks.get() >= 3, "ticker ran {} times", ticks.get());
    }

    #[tokio::test]
    async fn normal_reads_never_pause() {
        let fs = Arc::new(MockFileSystem::with_files([("/bank/a.md", "a".repeat(99))]));
        let policy = StreamingPolicy { size_threshold: 100, ..StreamingPolicy::default() };
        let (reader, _) = reader_over(&fs, policy);
        let outcome = reader.read_file("a.md", ReadOptions::default()).await.unwrap();
        assert!(!outcome.was_streamed);
        assert_eq!(outcome.backpressure_pauses, 0);
    }

    #[tokio::test]
    async fn progress_can_be_disabled() {
        let fs = Arc::new(MockFileSystem::with_files([("/bank/big.md", "y".repeat(MIB))]));
        let policy = StreamingPolicy { progress_enabled: false, ..StreamingPolicy::default() };
        let (reader, _) = reader_over(&fs, policy);
        let options = ReadOptions::default().with_progress(|_, _| panic!("progress reported while disabled"));
        let outcome = reader.read_file("big.md", options).await.unwrap();
        assert_eq!(outcome.chunks_processed, 16);
    }

    #[tokio::test]
    async fn would_stream_follows_the_threshold() {
        let fs = Arc::new(MockFileSystem::with_files([
            ("/bank/below.md", "a".repeat(99)),
            ("/bank/at.md", "a".repeat(100)),
            ("/bank/above.md", "a".repeat(101)),
        ]));
        let policy = StreamingPolicy { size_threshold: 100, ..StreamingPolicy::default() };
        let (reader, _) = reader_over(&fs, policy);
        assert!(!reader.would_stream_file("below.md").await.unwrap());
        assert!(reader.would_stream_file("at.md").await.unwrap());
        assert!(reader.would_stream_file("above.md").await.unwrap());
    }

    #[tokio::test]
    async fn invalid_utf8_fails_to_parse() {
        let mut bytes = vec![b'a'; 200];
        bytes[150] = 0xff;
        let fs = Arc::new(MockFileSystem::with_files([("/bank/bad.md", bytes)]));
        let policy = StreamingPolicy { size_threshold: 100, chunk_size: 64, ..StreamingPolicy::default() };
        let (reader, _) = reader_over(&fs, policy);
        let err = reader.read_file("bad.md", ReadOptions::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::StreamingParse(_)));
        assert_eq!(err.code(), "STREAMING_PARSE_ERROR");
    }

    #[tokio::test]
    async fn early_end_of_stream_is_reported() {
        let fs = Arc::new(MockFileSystem::with_files([("/bank/big.md", "z".repeat(500))]));
        let policy = StreamingPolicy { size_threshold: 100, chunk_size: 64, ..StreamingPolicy::default() };
        let (reader, _) = reader_over(&fs, policy);
        // First call is the stat, second opens the reader.
        fs.inject(1, Fault::Pass);
        fs.inject(1, Fault::Truncate(300));
        let err = reader.read_file("big.md", ReadOptions::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::StreamClosedPrematurely { expected: 500, received: 300, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_stream_times_out() {
        let fs = Arc::new(MockFileSystem::with_files([("/bank/big.md", "z".repeat(500))]));
        let policy = StreamingPolicy { size_threshold: 100, ..StreamingPolicy::default() };
        let (reader, _) = reader_over(&fs, policy);
        fs.inject(1, Fault::Pass);
        fs.stall_next(1);
        let options = ReadOptions::default().with_timeout(Duration::from_secs(2));
        let err = reader.read_file("big.md", options).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::StreamingTimeout(_)));
        assert_eq!(err.code(), "STREAMING_TIMEOUT");
    }

    #[tokio::test(start_paused = true)]
    async fn stream_stalling_between_chunks_times_out() {
        let fs = Arc::new(MockFileSystem::with_files([("/bank/big.md", "z".repeat(500))]));
        let policy = StreamingPolicy { size_threshold: 100, chunk_size: 64, ..StreamingPolicy::default() };
        let (reader, _) = reader_over(&fs, policy);
        fs.inject(1, Fault::Pass);
        fs.inject(1, Fault::StallAfter(200));

        let last_progress = Arc::new(AtomicU64::new(0));
        let options = ReadOptions::default().with_timeout(Duration::from_secs(2)).with_progress({
            let last = Arc::clone(&last_progress);
            move |read, _| last.store(read, Ordering::SeqCst)
        });
        let started = tokio::time::Instant::now();
        let err = reader.read_file("big.md", options).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::StreamingTimeout(_)));
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        // Three whole chunks arrived before the stream went quiet.
        assert_eq!(last_progress.load(Ordering::SeqCst), 192);
        assert_eq!(reader.stats(), StreamingStatistics::default());
    }

    #[tokio::test]
    async fn missing_file_fails_to_stat() {
        let fs = Arc::new(MockFileSystem::default());
        let ops = RetryingFileOps::new(
            Arc::clone(&fs) as Arc<dyn FileSystem>,
            "/bank",
            RetryPolicy { max_retries: 0, ..RetryPolicy::default() },
        )
        .unwrap();
        let reader = StreamingReader::new(ops, Arc::new(BoundedCache::default()), StreamingPolicy::default());
        let err = reader.read_file("missing.md", ReadOptions::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Stat(_)));
        let err = reader.read_file("../escape.md", ReadOptions::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[tokio::test]
    async fn statistics_track_both_paths() {
        let fs = Arc::new(MockFileSystem::with_files([
            ("/bank/small.md", "a".repeat(10)),
            ("/bank/big.md", "b".repeat(200)),
        ]));
        let policy = StreamingPolicy { size_threshold: 100, chunk_size: 64, ..StreamingPolicy::default() };
        let (reader, _) = reader_over(&fs, policy);
        reader.read_file("small.md", ReadOptions::default()).await.unwrap();
        reader.read_file("big.md", ReadOptions::default()).await.unwrap();

        let stats = reader.stats();
        assert_eq!(stats.total_operations, 2);
        assert_eq!(stats.streamed_operations, 1);
        assert_eq!(stats.total_bytes_read, 210);
        assert_eq!(stats.largest_streamed_file, 200);

        reader.reset_stats();
        assert_eq!(reader.stats(), StreamingStatistics::default());
    }
}
