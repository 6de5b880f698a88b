//! Filesystem error taxonomy.
//!
//! Every public operation funnels its OS-level failure through
//! [`FsError::from_io`], so callers only ever see one of the five
//! taxonomy variants, never a raw OS error.

use std::io;
use std::path::Path;
use thiserror::Error;

/// Normalized filesystem error.
#[derive(Debug, Error)]
pub enum FsError {
    /// File or directory not found.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Expected a file but found a directory.
    #[error("file is a directory: {0}")]
    FileIsADirectory(String),

    /// Target already exists.
    #[error("file already exists: {0}")]
    FileExists(String),

    /// Permission denied.
    #[error("no permissions: {0}")]
    NoPermissions(String),

    /// Anything the taxonomy cannot classify.
    #[error("{0}")]
    Unknown(String),
}

impl FsError {
    /// Create a FileNotFound error.
    pub fn file_not_found(what: impl Into<String>) -> Self {
        Self::FileNotFound(what.into())
    }

    /// Create a FileIsADirectory error.
    pub fn file_is_a_directory(what: impl Into<String>) -> Self {
        Self::FileIsADirectory(what.into())
    }

    /// Create a FileExists error.
    pub fn file_exists(what: impl Into<String>) -> Self {
        Self::FileExists(what.into())
    }

    /// Create a NoPermissions error.
    pub fn no_permissions(what: impl Into<String>) -> Self {
        Self::NoPermissions(what.into())
    }

    /// Create an Unknown error.
    pub fn unknown(what: impl Into<String>) -> Self {
        Self::Unknown(what.into())
    }

    /// Stable name of the taxonomy variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::FileNotFound(_) => "FileNotFound",
            Self::FileIsADirectory(_) => "FileIsADirectory",
            Self::FileExists(_) => "FileExists",
            Self::NoPermissions(_) => "NoPermissions",
            Self::Unknown(_) => "Unknown",
        }
    }

    /// Normalize a raw OS error for an operation on `path`.
    ///
    /// This is the single mapping point from `io::Error` into the
    /// taxonomy. Idempotence holds by construction: an `FsError` is
    /// built exactly once per failure and is never re-wrapped.
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        Self::map_kind(err.kind(), format!("{} ({})", err, path.display()))
    }

    /// Normalize a move/copy failure between two endpoints.
    ///
    /// OS codes that point at a path or handle constraint (EINVAL,
    /// EBUSY, ENAMETOOLONG) are rewritten into a message naming both
    /// endpoints before normalization; the taxonomy variant they map
    /// to is unchanged. All other errors pass through [`Self::from_io`].
    pub fn from_move_copy_io(err: io::Error, from: &Path, to: &Path) -> Self {
        use io::ErrorKind::{InvalidFilename, InvalidInput, ResourceBusy};

        if matches!(err.kind(), InvalidInput | ResourceBusy | InvalidFilename) {
            let message = format!(
                "unable to move/copy '{}' into '{}' ({})",
                from.display(),
                to.display(),
                err
            );
            return Self::map_kind(err.kind(), message);
        }
        Self::from_io(err, from)
    }

    fn map_kind(kind: io::ErrorKind, message: String) -> Self {
        match kind {
            io::ErrorKind::NotFound => Self::FileNotFound(message),
            io::ErrorKind::PermissionDenied => Self::NoPermissions(message),
            io::ErrorKind::AlreadyExists => Self::FileExists(message),
            io::ErrorKind::IsADirectory => Self::FileIsADirectory(message),
            _ => Self::Unknown(message),
        }
    }
}

/// Filesystem result type.
pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_kind_mapping() {
        let path = Path::new("/tmp/x");
        let cases = [
            (io::ErrorKind::NotFound, "FileNotFound"),
            (io::ErrorKind::PermissionDenied, "NoPermissions"),
            (io::ErrorKind::AlreadyExists, "FileExists"),
            (io::ErrorKind::IsADirectory, "FileIsADirectory"),
            (io::ErrorKind::TimedOut, "Unknown"),
        ];
        for (kind, code) in cases {
            let err = FsError::from_io(io::Error::new(kind, "boom"), path);
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn test_message_carries_path() {
        let err = FsError::from_io(
            io::Error::new(io::ErrorKind::NotFound, "gone"),
            Path::new("/tmp/missing.txt"),
        );
        assert!(err.to_string().contains("/tmp/missing.txt"));
    }

    #[test]
    fn test_move_copy_rewrite_preserves_code() {
        let from = Path::new("/a/src");
        let to = Path::new("/a/dst");

        let busy = FsError::from_move_copy_io(
            io::Error::new(io::ErrorKind::ResourceBusy, "resource busy"),
            from,
            to,
        );
        assert_eq!(busy.code(), "Unknown");
        assert!(busy.to_string().contains("/a/src"));
        assert!(busy.to_string().contains("/a/dst"));

        let invalid = FsError::from_move_copy_io(
            io::Error::new(io::ErrorKind::InvalidInput, "invalid argument"),
            from,
            to,
        );
        assert!(invalid.to_string().contains("unable to move/copy"));
    }

    #[test]
    fn test_move_copy_other_errors_pass_through() {
        let err = FsError::from_move_copy_io(
            io::Error::new(io::ErrorKind::NotFound, "gone"),
            Path::new("/a/src"),
            Path::new("/a/dst"),
        );
        assert_eq!(err.code(), "FileNotFound");
        assert!(!err.to_string().contains("unable to move/copy"));
    }
}
