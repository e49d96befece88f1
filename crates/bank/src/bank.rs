use crate::error::{ErrorKind, Result};
use crate::health::{HealthIssue, HealthReport, InitializationStatus, Invalidity, Problem};
use crate::{BuiltinTemplates, Category, DocumentRecord, DocumentType, TemplateProvider};
use derive_more::Display;
use exn::ResultExt;
use membank_cache::{BoundedCache, CacheConfig, CacheStatistics};
use membank_config::Config;
use membank_storage::error::Result as StorageResult;
use membank_storage::{
    AccessMode, FileSystemHandle, LocalFileSystem, PathLocks, ReadOptions, RetryPolicy, RetryingFileOps,
    StreamingPolicy, StreamingReader, StreamingStatistics, validate_path,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::instrument;

/// Lifecycle of a [`MemoryBank`].
///
/// A failed [`load_files`](MemoryBank::load_files) falls back to
/// `FoldersEnsured`; only a complete load reaches `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BankState {
    #[display("uninitialized")]
    Uninitialized,
    #[display("folders ensured")]
    FoldersEnsured,
    #[display("loading")]
    Loading,
    #[display("ready")]
    Ready,
}

/// Tunables for the layers underneath a [`MemoryBank`].
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub cache: CacheConfig,
    pub retry: RetryPolicy,
    pub streaming: StreamingPolicy,
}
impl From<&Config> for Options {
    fn from(config: &Config) -> Self {
        Self { cache: config.cache_config(), retry: config.retry_policy(), streaming: config.streaming_policy() }
    }
}

/// A fixed set of markdown documents under one root directory, kept in memory
/// and written back to disk.
///
/// Missing documents are recreated from a [`TemplateProvider`] when loading,
/// so a damaged bank heals itself on the next [`load_files`](Self::load_files).
/// Reads and writes to the same file are serialized.
pub struct MemoryBank {
    ops: RetryingFileOps,
    reader: StreamingReader,
    cache: Arc<BoundedCache>,
    templates: Box<dyn TemplateProvider>,
    locks: PathLocks,
    records: Mutex<BTreeMap<DocumentType, DocumentRecord>>,
    state: Mutex<BankState>,
}

impl MemoryBank {
    /// # Errors
    /// [`ErrorKind::MissingRoot`] for an empty `root`, and
    /// [`ErrorKind::Configuration`] when the root cannot be resolved.
    pub fn new(
        root: impl AsRef<Path>,
        fs: FileSystemHandle,
        templates: impl TemplateProvider + 'static,
        options: Options,
    ) -> Result<Self> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            exn::bail!(ErrorKind::MissingRoot);
        }
        let ops = RetryingFileOps::new(fs, root, options.retry).or_raise(|| ErrorKind::Configuration)?;
        let cache = Arc::new(BoundedCache::new(options.cache));
        let reader = StreamingReader::new(ops.clone(), Arc::clone(&cache), options.streaming);
        tracing::debug!(root = %ops.root().display(), fs = ops.filesystem().name(), "Memory bank configured");
        Ok(Self {
            ops,
            reader,
            cache,
            templates: Box::new(templates),
            locks: PathLocks::default(),
            records: Mutex::default(),
            state: Mutex::new(BankState::Uninitialized),
        })
    }

    pub fn from_config(config: &Config, fs: FileSystemHandle, templates: impl TemplateProvider + 'static) -> Result<Self> {
        let root = config.root().or_raise(|| ErrorKind::MissingRoot)?;
        Self::new(root, fs, templates, Options::from(config))
    }

    /// A memory bank on the local disk with the builtin templates and default
    /// tunables.
    pub fn local(root: impl AsRef<Path>) -> Result<Self> {
        Self::new(root, Arc::new(LocalFileSystem::default()), BuiltinTemplates, Options::default())
    }

    /// Absolute, resolved root directory.
    pub fn root(&self) -> &Path {
        self.ops.root()
    }

    pub fn state(&self) -> BankState {
        *lock(&self.state)
    }

    fn set_state(&self, state: BankState) {
        let mut current = lock(&self.state);
        if *current != state {
            tracing::debug!(from = %*current, to = %state, "Memory bank state changed");
            *current = state;
        }
    }

    /// Create the root and the category folders. Safe to call repeatedly.
    #[instrument(skip_all, fields(root = %self.root().display()))]
    pub async fn initialize_folders(&self) -> Result<()> {
        self.ops.create_dir(self.root()).await.or_raise(|| ErrorKind::Initialize)?;
        for category in Category::ALL {
            self.ops.create_dir(category.folder()).await.or_raise(|| ErrorKind::Initialize)?;
        }
        if self.state() == BankState::Uninitialized {
            self.set_state(BankState::FoldersEnsured);
        }
        Ok(())
    }

    /// Read every document into memory, creating the missing ones from their
    /// template.
    ///
    /// Returns the documents that had to be created, in catalogue order.
    #[instrument(skip_all, fields(root = %self.root().display()))]
    pub async fn load_files(&self) -> Result<Vec<DocumentType>> {
        if self.state() == BankState::Uninitialized {
            self.initialize_folders().await.or_raise(|| ErrorKind::Load)?;
        }
        self.set_state(BankState::Loading);

        let mut created = Vec::new();
        for document in DocumentType::ALL {
            match self.load_document(document).await {
                Ok(true) => created.push(document),
                Ok(false) => {},
                Err(err) => {
                    self.set_state(BankState::FoldersEnsured);
                    tracing::error!(%document, error = %*err, "Could not load document");
                    return Err(err.raise(ErrorKind::Load));
                },
            }
        }

        self.set_state(BankState::Ready);
        tracing::info!(created = created.len(), total = DocumentType::ALL.len(), "Memory bank loaded");
        Ok(created)
    }

    /// Returns `true` when `document` had to be created.
    async fn load_document(&self, document: DocumentType) -> StorageResult<bool> {
        let path = self.ops.resolve(document.relative_path())?;
        let _guard = self.locks.lock(&path).await;
        if !self.ops.exists(&path).await? {
            let content = self.templates.template(document);
            self.persist(&path, &content).await?;
            self.store(DocumentRecord::new(document, content));
            tracing::info!(%document, path = %path.display(), "Created missing document from template");
            return Ok(true);
        }
        let outcome = self.reader.read_file(&path, ReadOptions::default()).await?;
        self.store(DocumentRecord::new(document, outcome.content));
        Ok(false)
    }

    /// Write `content` and refresh the cache entry with the new modification
    /// time. The caller holds the path lock.
    ///
    /// Content large enough to be streamed back is not cached, matching
    /// [`StreamingReader`], which never consults the cache for such files.
    async fn persist(&self, path: &Path, content: &str) -> StorageResult<()> {
        self.ops.write(path, content).await?;
        if self.reader.policy().should_stream(content.len() as u64) {
            tracing::debug!(path = %path.display(), bytes = content.len(), "Not caching streamed document");
            self.cache.invalidate(Some(path));
            return Ok(());
        }
        match self.ops.stat(path).await {
            Ok(stat) => self.cache.put(stat.path, content, stat.modified),
            Err(err) => {
                // Written, but without an mtime the cached copy could never be
                // validated again.
                tracing::warn!(path = %path.display(), error = %*err, "Could not stat written file");
                self.cache.invalidate(Some(path));
            },
        }
        Ok(())
    }

    fn store(&self, record: DocumentRecord) {
        lock(&self.records).insert(record.document_type, record);
    }

    pub fn get_file(&self, document: DocumentType) -> Option<DocumentRecord> {
        lock(&self.records).get(&document).cloned()
    }

    /// Every loaded document, in catalogue order.
    pub fn get_all_files(&self) -> Vec<DocumentRecord> {
        lock(&self.records).values().cloned().collect()
    }

    /// Replace the content of `document` on disk, then in memory.
    ///
    /// # Errors
    /// [`ErrorKind::Update`] if the write fails; the in-memory record is left
    /// as it was.
    #[instrument(skip_all, fields(document = %document))]
    pub async fn update_file(&self, document: DocumentType, content: impl Into<String>) -> Result<DocumentRecord> {
        let content = content.into();
        let path = self.ops.resolve(document.relative_path()).or_raise(|| ErrorKind::Update(document))?;
        let _guard = self.locks.lock(&path).await;
        self.persist(&path, &content).await.or_raise(|| ErrorKind::Update(document))?;
        let record = DocumentRecord::new(document, content);
        self.store(record.clone());
        tracing::info!(path = %path.display(), bytes = record.content.len(), "Updated document");
        Ok(record)
    }

    /// Write `content` to a file below the root, given relative to it.
    ///
    /// Writing to the path of a catalogued document also updates that
    /// document's record. Returns the absolute path written.
    ///
    /// # Errors
    /// [`ErrorKind::Write`] for absolute or escaping paths, the root itself,
    /// and failed writes.
    #[instrument(skip_all, fields(path = %relative.as_ref().display()))]
    pub async fn write_file_by_path(&self, relative: impl AsRef<Path>, content: impl Into<String>) -> Result<PathBuf> {
        let relative = relative.as_ref();
        let path = validate_path(relative, self.root(), false).or_raise(|| ErrorKind::Write(relative.to_path_buf()))?;
        if path == self.root() {
            exn::bail!(ErrorKind::Write(relative.to_path_buf()));
        }
        let content = content.into();
        let _guard = self.locks.lock(&path).await;
        self.persist(&path, &content).await.or_raise(|| ErrorKind::Write(relative.to_path_buf()))?;
        if let Some(document) = path.strip_prefix(self.root()).ok().and_then(DocumentType::from_relative_path) {
            self.store(DocumentRecord::new(document, content));
        }
        tracing::debug!("Wrote file");
        Ok(path)
    }

    /// Validate every document on disk: present, a regular file, readable
    /// and writable. Cache entries of invalid documents are dropped.
    pub async fn initialization_status(&self) -> InitializationStatus {
        let root_exists = self.ops.exists(self.root()).await.unwrap_or(false);
        let mut invalid = BTreeMap::new();
        for document in DocumentType::ALL {
            let invalidity = match root_exists {
                true => self.validate_document(document).await,
                false => Some(Invalidity::Missing),
            };
            if let Some(invalidity) = invalidity {
                tracing::debug!(%document, %invalidity, "Invalid document");
                if let Ok(path) = self.ops.resolve(document.relative_path()) {
                    self.cache.invalidate(Some(&path));
                }
                invalid.insert(document, invalidity);
            }
        }
        InitializationStatus { root_exists, invalid }
    }

    /// Whether every document exists and is usable. Never fails: any error
    /// along the way counts as "not initialized".
    pub async fn get_is_memory_bank_initialized(&self) -> bool {
        let status = self.initialization_status().await;
        if !status.is_initialized() {
            tracing::info!(root_exists = status.root_exists, invalid = status.invalid.len(), "Memory bank not initialized");
        }
        status.is_initialized()
    }

    async fn validate_document(&self, document: DocumentType) -> Option<Invalidity> {
        let Ok(path) = self.ops.resolve(document.relative_path()) else {
            return Some(Invalidity::Inaccessible);
        };
        match self.ops.exists(&path).await {
            Ok(true) => {},
            Ok(false) => return Some(Invalidity::Missing),
            Err(_) => return Some(Invalidity::Inaccessible),
        }
        match self.ops.stat(&path).await {
            Ok(stat) if stat.is_file() => {},
            Ok(_) => return Some(Invalidity::NotAFile),
            Err(_) => return Some(Invalidity::Inaccessible),
        }
        self.ops.access(&path, AccessMode::ReadWrite).await.err().map(|_| Invalidity::Inaccessible)
    }

    async fn is_dir(&self, path: &Path) -> bool {
        // Check existence first; a stat on a missing path would be retried.
        matches!(self.ops.exists(path).await, Ok(true))
            && matches!(self.ops.stat(path).await, Ok(stat) if stat.is_dir())
    }

    /// Inspect the root, the category folders and every document without
    /// changing anything, on disk or in memory.
    #[instrument(skip_all, fields(root = %self.root().display()))]
    pub async fn check_health(&self) -> HealthReport {
        let root = self.root();
        if !self.is_dir(root).await {
            let issue = HealthIssue { path: root.to_path_buf(), problem: Problem::MissingRoot };
            return HealthReport::new(false, vec![issue]);
        }

        let mut issues = Vec::new();
        for category in Category::ALL {
            let path = root.join(category.folder());
            if !self.is_dir(&path).await {
                issues.push(HealthIssue { path, problem: Problem::MissingFolder { category } });
            }
        }
        for document in DocumentType::ALL {
            if let Some(invalidity) = self.validate_document(document).await {
                let path = root.join(document.relative_path());
                issues.push(HealthIssue { path, problem: Problem::Document { document, invalidity } });
            }
        }
        let report = HealthReport::new(true, issues);
        tracing::debug!(healthy = report.healthy, issues = report.issues.len(), "Health check complete");
        report
    }

    /// Drop one cached file, or everything when `path` is `None`. Relative
    /// paths are taken from the root. Returns the number of entries removed.
    pub fn invalidate_cache(&self, path: Option<&Path>) -> usize {
        let Some(path) = path else {
            return self.cache.invalidate(None);
        };
        match self.ops.resolve(path) {
            Ok(path) => self.cache.invalidate(Some(&path)),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %*err, "Not invalidating path outside the root");
                0
            },
        }
    }

    pub fn get_cache_stats(&self) -> CacheStatistics {
        self.cache.stats()
    }

    pub fn reset_cache_stats(&self) {
        self.cache.reset_stats();
    }

    pub fn streaming_stats(&self) -> StreamingStatistics {
        self.reader.stats()
    }

    pub fn reset_streaming_stats(&self) {
        self.reader.reset_stats();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Guards are only held for plain map/enum updates, which leave the data
    // consistent even if a panic poisons the lock.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
