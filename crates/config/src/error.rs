//! Configuration Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// An explicitly requested configuration file does not exist
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// File extension is not one of `toml`, `yaml`, `yml` or `json`
    #[display("unsupported configuration format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// Merging or deserializing the configuration layers failed
    #[display("could not load configuration: {_0}")]
    Load(#[error(not(source))] String),
    /// Configuration loaded, but a value is out of range
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// No memory bank root was configured
    #[display("no memory bank root configured")]
    MissingRoot,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingRoot => "MISSING_ROOT",
            _ => "CONFIG_ERROR",
        }
    }

    /// Configuration never fixes itself between attempts.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
