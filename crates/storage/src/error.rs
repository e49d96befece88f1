//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Raw filesystem failures (`NotFound`, `PermissionDenied`, `Io`) are what the
//! backends produce. The retry layer and the streaming reader raise their own
//! kinds on top, so the original cause stays in the error tree as a child.

use derive_more::{Display, Error};
use std::io::{Error as IoError, ErrorKind as IoErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Name of the low-level operation a retry-layer error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Operation {
    #[display("read")]
    Read,
    #[display("write")]
    Write,
    #[display("mkdir")]
    CreateDir,
    #[display("stat")]
    Stat,
    #[display("access")]
    Access,
    #[display("exists")]
    Exists,
    #[display("open")]
    Open,
}

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Path contains invalid characters, traverses upwards, or escapes root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// File does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied by the operating system
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// A single attempt lost its race against the operation timer
    #[display("{operation} timed out after {}ms: {}", after.as_millis(), path.display())]
    Timeout { operation: Operation, path: PathBuf, after: Duration },
    /// Terminal failure of the retry layer (non-transient, or retries exhausted)
    #[display("{operation} failed after {attempts} attempt(s): {}", path.display())]
    OperationFailed { operation: Operation, path: PathBuf, attempts: u32 },
    #[display("could not stat: {}", _0.display())]
    Stat(#[error(not(source))] PathBuf),
    #[display("could not read: {}", _0.display())]
    NormalRead(#[error(not(source))] PathBuf),
    #[display("could not stream: {}", _0.display())]
    StreamingRead(#[error(not(source))] PathBuf),
    #[display("streaming read timed out: {}", _0.display())]
    StreamingTimeout(#[error(not(source))] PathBuf),
    #[display("streamed content is not valid UTF-8: {}", _0.display())]
    StreamingParse(#[error(not(source))] PathBuf),
    #[display("stream closed after {received} of {expected} bytes: {}", path.display())]
    StreamClosedPrematurely { path: PathBuf, expected: u64, received: u64 },
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Map an I/O error onto the raw filesystem kinds, keeping the path for
    /// the two cases callers most often branch on.
    pub fn from_io(err: IoError, path: &Path) -> Self {
        match err.kind() {
            IoErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            IoErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    /// Stable, machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPath(_) => "PATH_VALIDATION_ERROR",
            Self::NotFound(_) | Self::PermissionDenied(_) | Self::Io(_) => "UNKNOWN_ERROR",
            Self::Timeout { .. } => "OPERATION_TIMEOUT",
            Self::OperationFailed { .. } => "OPERATION_FAILED",
            Self::Stat(_) => "STAT_ERROR",
            Self::NormalRead(_) => "NORMAL_READ_ERROR",
            Self::StreamingRead(_) => "STREAMING_READ_ERROR",
            Self::StreamingTimeout(_) => "STREAMING_TIMEOUT",
            Self::StreamingParse(_) => "STREAMING_PARSE_ERROR",
            Self::StreamClosedPrematurely { .. } => "STREAM_CLOSED_PREMATURELY",
        }
    }

    /// Returns `true` if retrying might succeed.
    ///
    /// Only the narrow transient set qualifies: a busy resource, handle or
    /// file-table exhaustion, a momentarily absent file, a timed out attempt,
    /// or a reset connection (network filesystems).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::Timeout { .. } => true,
            Self::Io(err) => is_transient_io(err),
            _ => false,
        }
    }
}

#[cfg(unix)]
const TRANSIENT_OS_ERRORS: &[i32] = &[
    16, // EBUSY
    23, // ENFILE
    24, // EMFILE
];
#[cfg(windows)]
const TRANSIENT_OS_ERRORS: &[i32] = &[
    4,  // ERROR_TOO_MANY_OPEN_FILES
    32, // ERROR_SHARING_VIOLATION
    33, // ERROR_LOCK_VIOLATION
];
#[cfg(not(any(unix, windows)))]
const TRANSIENT_OS_ERRORS: &[i32] = &[];

fn is_transient_io(err: &IoError) -> bool {
    match err.kind() {
        IoErrorKind::ResourceBusy | IoErrorKind::NotFound | IoErrorKind::TimedOut | IoErrorKind::ConnectionReset => {
            true
        },
        _ => err.raw_os_error().is_some_and(|code| TRANSIENT_OS_ERRORS.contains(&code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(IoErrorKind::ResourceBusy, true)]
    #[case(IoErrorKind::TimedOut, true)]
    #[case(IoErrorKind::ConnectionReset, true)]
    #[case(IoErrorKind::NotFound, true)]
    #[case(IoErrorKind::PermissionDenied, false)]
    #[case(IoErrorKind::InvalidData, false)]
    #[case(IoErrorKind::AlreadyExists, false)]
    fn io_kinds(#[case] kind: IoErrorKind, #[case] retryable: bool) {
        assert_eq!(ErrorKind::Io(IoError::from(kind)).is_retryable(), retryable);
    }

    #[cfg(unix)]
    #[rstest]
    #[case(16, true)]
    #[case(23, true)]
    #[case(24, true)]
    #[case(13, false)]
    #[case(28, false)]
    fn os_codes(#[case] code: i32, #[case] retryable: bool) {
        assert_eq!(ErrorKind::Io(IoError::from_raw_os_error(code)).is_retryable(), retryable);
    }

    #[test]
    fn from_io_keeps_path_for_common_cases() {
        let path = Path::new("/bank/core/projectbrief.md");
        let kind = ErrorKind::from_io(IoError::from(IoErrorKind::NotFound), path);
        assert!(matches!(&kind, ErrorKind::NotFound(p) if p == path));
        assert!(kind.is_retryable());
        let kind = ErrorKind::from_io(IoError::from(IoErrorKind::PermissionDenied), path);
        assert!(matches!(kind, ErrorKind::PermissionDenied(_)));
        assert!(!kind.is_retryable());
    }

    #[test]
    fn terminal_kinds_are_not_retryable() {
        let path = PathBuf::from("a.md");
        let failed = ErrorKind::OperationFailed { operation: Operation::Read, path: path.clone(), attempts: 4 };
        assert!(!failed.is_retryable());
        assert_eq!(failed.code(), "OPERATION_FAILED");
        assert!(!ErrorKind::InvalidPath(path.clone()).is_retryable());
        assert!(!ErrorKind::StreamingTimeout(path).is_retryable());
    }

    #[test]
    fn display_includes_context() {
        let kind = ErrorKind::Timeout {
            operation: Operation::Stat,
            path: PathBuf::from("/bank/x.md"),
            after: Duration::from_millis(250),
        };
        assert_eq!(kind.to_string(), "stat timed out after 250ms: /bank/x.md");
        assert_eq!(kind.code(), "OPERATION_TIMEOUT");
    }
}
