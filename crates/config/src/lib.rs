//! Memory bank configuration.
//!
//! Values are layered, later layers winning:
//! 1. built-in defaults,
//! 2. an optional configuration file (TOML, YAML or JSON, chosen by extension),
//! 3. environment variables prefixed with `MEMBANK_`, using `__` to reach
//!    nested keys (`MEMBANK_CACHE__CAPACITY=50`).
//!
//! ```toml
//! root = "/home/me/project/memory-bank"
//!
//! [cache]
//! capacity = 100
//! max_age_secs = 3600
//!
//! [streaming]
//! size_threshold = 1048576
//! chunk_size = 65536
//! timeout_ms = 30000
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 100
//! max_delay_ms = 5000
//! backoff_factor = 2.0
//! ```

pub mod error;
mod loader;

use crate::error::{ErrorKind, Result};
pub use crate::loader::{ENV_PREFIX, default_config_file};
use membank_cache::CacheConfig;
use membank_storage::{RetryPolicy, StreamingPolicy, defaults};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    pub capacity: usize,
    pub max_age_secs: u64,
    pub metrics_enabled: bool,
}
impl Default for CacheSection {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            capacity: defaults.capacity,
            max_age_secs: defaults.max_age.as_secs(),
            metrics_enabled: defaults.metrics_enabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamingSection {
    /// Files of at least this many bytes are streamed.
    pub size_threshold: u64,
    pub chunk_size: usize,
    pub timeout_ms: u64,
    pub progress_enabled: bool,
}
impl Default for StreamingSection {
    fn default() -> Self {
        Self {
            size_threshold: defaults::DEFAULT_SIZE_THRESHOLD,
            chunk_size: defaults::DEFAULT_CHUNK_SIZE,
            timeout_ms: millis(defaults::DEFAULT_STREAMING_TIMEOUT),
            progress_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    /// Per-attempt deadline for low-level file operations.
    pub timeout_ms: u64,
}
impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: defaults::DEFAULT_MAX_RETRIES,
            base_delay_ms: millis(defaults::DEFAULT_BASE_DELAY),
            max_delay_ms: millis(defaults::DEFAULT_MAX_DELAY),
            backoff_factor: defaults::DEFAULT_BACKOFF_FACTOR,
            timeout_ms: millis(defaults::DEFAULT_OPERATION_TIMEOUT),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the memory bank. Required, but only checked when
    /// asked for through [`root`](Self::root).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    pub cache: CacheSection,
    pub streaming: StreamingSection,
    pub retry: RetrySection,
}

impl Config {
    /// Load from defaults, `file` (or the per-user default file when it
    /// exists), and `MEMBANK_*` environment variables, then validate.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(file, ENV_PREFIX)
    }

    /// Same as [`load`](Self::load) with a custom environment prefix.
    pub fn load_with_prefix(file: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let config: Self = loader::figment(file, env_prefix)?
            .extract()
            .map_err(|e| ErrorKind::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// The configured memory bank root.
    pub fn root(&self) -> Result<&Path> {
        match self.root.as_deref() {
            Some(root) if !root.as_os_str().is_empty() => Ok(root),
            _ => exn::bail!(ErrorKind::MissingRoot),
        }
    }

    /// Reject values that would make the file layer misbehave.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| exn::Exn::from(ErrorKind::Invalid(reason.to_string()));
        if self.cache.capacity == 0 {
            return Err(invalid("cache.capacity must be at least 1"));
        }
        if self.streaming.chunk_size == 0 {
            return Err(invalid("streaming.chunk_size must be at least 1"));
        }
        if self.streaming.timeout_ms == 0 || self.retry.timeout_ms == 0 {
            return Err(invalid("timeouts must be greater than zero"));
        }
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 1.0 {
            return Err(invalid("retry.backoff_factor must be a finite number of at least 1"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(invalid("retry.base_delay_ms must not exceed retry.max_delay_ms"));
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default()
            .with_capacity(self.cache.capacity)
            .with_max_age(Duration::from_secs(self.cache.max_age_secs))
            .with_metrics(self.cache.metrics_enabled)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            backoff_factor: self.retry.backoff_factor,
            timeout: Duration::from_millis(self.retry.timeout_ms),
        }
    }

    pub fn streaming_policy(&self) -> StreamingPolicy {
        StreamingPolicy {
            size_threshold: self.streaming.size_threshold,
            chunk_size: self.streaming.chunk_size,
            timeout: Duration::from_millis(self.streaming.timeout_ms),
            progress_enabled: self.streaming.progress_enabled,
        }
    }
}
