//! Memory Bank Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. The storage failure that caused an
//! error (path validation, retries exhausted, streaming timeout, ...) stays in
//! the tree as a child and keeps its own [`code`](membank_storage::error::ErrorKind::code).

use crate::DocumentType;
use derive_more::{Display, Error};
use std::path::PathBuf;

/// A memory bank error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for memory bank operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Constructed without a root directory
    #[display("no memory bank root configured")]
    MissingRoot,
    /// Configuration could not be turned into a working memory bank
    #[display("invalid memory bank configuration")]
    Configuration,
    #[display("could not create memory bank folders")]
    Initialize,
    /// At least one document could be neither read nor materialized
    #[display("could not load memory bank documents")]
    Load,
    #[display("could not update {_0}")]
    Update(#[error(not(source))] DocumentType),
    #[display("could not write {}", _0.display())]
    Write(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Stable, machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingRoot => "MISSING_ROOT",
            Self::Configuration => "CONFIG_ERROR",
            Self::Initialize => "INITIALIZE_ERROR",
            Self::Load => "LOAD_ERROR",
            Self::Update(_) => "UPDATE_ERROR",
            Self::Write(_) => "WRITE_ERROR",
        }
    }

    /// Returns `true` if retrying might succeed.
    ///
    /// Transient storage conditions were already retried underneath, so
    /// anything reaching this level is treated as final.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
