//! Path validation and security utilities.
//!
//! Every path handed to the file layer passes through [`validate`] first, which
//! pins it inside the allowed root and rejects traversal attempts.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Characters rejected in any path component. Null and control characters
/// truncate or confuse C-based syscalls; the rest are reserved on Windows and
/// would make the bank non-portable.
fn is_illegal(c: char) -> bool {
    c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*')
}

/// Validates a path against the allowed `root` and returns the absolute path
/// it refers to.
///
/// `root` is expected to have gone through [`resolve_root`] already. Relative
/// paths are joined onto it; absolute paths are only accepted when
/// `allow_absolute` is set, and must still land inside `root`.
///
/// > **Note:** Unlike a plain lexical normalizer, *any* `..` component is
/// >           rejected, even one that would stay inside the root.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use membank_storage::validate_path;
/// let root = Path::new("/srv/bank");
/// // Valid paths
/// assert_eq!(validate_path("core/projectbrief.md", root, false).unwrap(), Path::new("/srv/bank/core/projectbrief.md"));
/// assert_eq!(validate_path("./core//x.md", root, false).unwrap(), Path::new("/srv/bank/core/x.md"));
/// assert!(validate_path("/srv/bank/progress.md", root, true).is_ok());
/// // Invalid paths
/// assert!(validate_path("../etc/passwd", root, false).is_err());
/// assert!(validate_path("core/../x.md", root, false).is_err());
/// assert!(validate_path("/srv/bank/progress.md", root, false).is_err());
/// assert!(validate_path("/etc/passwd", root, true).is_err());
/// assert!(validate_path("a\0b", root, false).is_err());
/// ```
pub fn validate(path: impl AsRef<Path>, root: impl AsRef<Path>, allow_absolute: bool) -> Result<PathBuf> {
    let (path, root) = (path.as_ref(), root.as_ref());
    let invalid = || exn::Exn::from(ErrorKind::InvalidPath(path.to_path_buf()));

    let absolute = path.is_absolute();
    if absolute && !allow_absolute {
        return Err(invalid());
    }

    let mut resolved = match absolute {
        true => PathBuf::new(),
        false => root.to_path_buf(),
    };
    for component in path.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix, so check
                // the raw bytes before looking at characters.
                if s.as_encoded_bytes().contains(&0) || s.to_string_lossy().chars().any(is_illegal) {
                    return Err(invalid());
                }
                resolved.push(s);
            },
            Component::CurDir => {},
            Component::ParentDir => return Err(invalid()),
            // Only meaningful as the head of an absolute path; a drive-relative
            // or root-relative path on Windows is neither relative nor absolute.
            Component::Prefix(_) | Component::RootDir if absolute => resolved.push(component.as_os_str()),
            Component::Prefix(_) | Component::RootDir => return Err(invalid()),
        }
    }

    match resolved.starts_with(root) {
        true => Ok(resolved),
        false => Err(invalid()),
    }
}

/// Resolve the allowed root once, before any validation happens against it.
///
/// An existing directory is canonicalized (so symlinked roots compare equal
/// to the paths the OS reports); otherwise the path is made absolute and
/// lexically normalized.
pub fn resolve_root(root: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root.as_ref();
    if root.as_os_str().is_empty() || root.as_os_str().as_encoded_bytes().contains(&0) {
        exn::bail!(ErrorKind::InvalidPath(root.to_path_buf()));
    }
    // Non-async here; it only happens once on construction and it's not worth
    // making every constructor async.
    if let Ok(canonical) = std::fs::canonicalize(root) {
        return Ok(canonical);
    }
    let absolute = std::path::absolute(root).map_err(|e| ErrorKind::from_io(e, root))?;
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                normalized.pop();
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}
