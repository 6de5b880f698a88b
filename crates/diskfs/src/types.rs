//! Core provider types.
//!
//! Record types carry serde derives so they can cross an RPC boundary
//! unchanged; none of them hold OS handles except [`FileHandle`], which
//! is deliberately not serializable.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{FsError, FsResult};

bitflags! {
    /// Kind of a filesystem entry.
    ///
    /// `SYMBOLIC_LINK` combines with `FILE` or `DIRECTORY` when the
    /// link target resolves; a dangling link reports the bare flag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileType: u32 {
        const FILE = 1 << 0;
        const DIRECTORY = 1 << 1;
        const SYMBOLIC_LINK = 1 << 2;
    }
}

// bitflags does not derive serde support onto generated types; the
// record types embedding `FileType` carry derives, so wire the impls
// through the helper module by hand.
impl Serialize for FileType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        bitflags::serde::serialize(self, serializer)
    }
}

impl<'de> Deserialize<'de> for FileType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        bitflags::serde::deserialize(deserializer)
    }
}

bitflags! {
    /// What a provider instance can do.
    ///
    /// Computed once at construction and fixed for the instance's
    /// lifetime.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        /// Whole-file read and write.
        const FILE_READ_WRITE = 1 << 0;
        /// Descriptor-based open/close/read/write.
        const FILE_OPEN_READ_WRITE_CLOSE = 1 << 1;
        /// Recursive folder copy.
        const FILE_FOLDER_COPY = 1 << 2;
        /// Paths on this provider are case sensitive.
        const PATH_CASE_SENSITIVE = 1 << 3;
    }
}

/// Identifier for a resource: a URI scheme plus an absolute local path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    scheme: String,
    path: PathBuf,
}

impl Resource {
    /// Scheme of local-disk resources.
    pub const SCHEME_FILE: &'static str = "file";

    /// Create a `file` resource.
    ///
    /// Relative paths are rejected here, before any OS call is made.
    pub fn file(path: impl Into<PathBuf>) -> FsResult<Self> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(FsError::unknown(format!(
                "path is not absolute: {}",
                path.display()
            )));
        }
        Ok(Self {
            scheme: Self::SCHEME_FILE.to_string(),
            path,
        })
    }

    /// URI scheme.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Absolute local path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resource addressing `name` inside this one.
    pub fn join(&self, name: impl AsRef<Path>) -> Self {
        Self {
            scheme: self.scheme.clone(),
            path: self.path.join(name),
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme, self.path.display())
    }
}

/// Metadata record for one entry, computed on demand and never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// Entry kind, bit-combinable.
    pub file_type: FileType,
    /// Creation time in epoch milliseconds (0 when the filesystem
    /// does not report one).
    pub ctime_ms: u64,
    /// Modification time in epoch milliseconds.
    pub mtime_ms: u64,
    /// Size in bytes.
    pub size: u64,
}

impl Stat {
    /// Returns true if the entry is (or links to) a regular file.
    pub fn is_file(&self) -> bool {
        self.file_type.contains(FileType::FILE)
    }

    /// Returns true if the entry is (or links to) a directory.
    pub fn is_directory(&self) -> bool {
        self.file_type.contains(FileType::DIRECTORY)
    }

    /// Returns true if the entry is a symbolic link.
    pub fn is_symbolic_link(&self) -> bool {
        self.file_type.contains(FileType::SYMBOLIC_LINK)
    }
}

/// Directory entry: name plus its independently resolved stat record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Stat record of the entry.
    pub stat: Stat,
}

/// Options for [`write_file`](crate::FileSystemProvider::write_file).
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Create the file when it does not exist.
    pub create: bool,
    /// Replace the file when it exists.
    pub overwrite: bool,
}

/// Options for [`open`](crate::FileSystemProvider::open).
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Open write-truncate-create; otherwise read-only.
    pub create: bool,
}

/// Options for [`delete`](crate::FileSystemProvider::delete).
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    /// Remove directories with their contents.
    pub recursive: bool,
    /// Move to the OS trash instead of removing. Not supported by the
    /// local provider.
    pub use_trash: bool,
}

/// Options for [`rename`](crate::FileSystemProvider::rename) and
/// [`copy`](crate::FileSystemProvider::copy).
#[derive(Debug, Clone, Copy, Default)]
pub struct OverwriteOptions {
    /// Replace an existing target.
    pub overwrite: bool,
}

/// What happened to a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Path came into existence.
    Created,
    /// Path contents or metadata changed.
    Modified,
    /// Path was removed.
    Deleted,
}

/// One change observed by a watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Kind of change.
    pub kind: ChangeKind,
    /// Affected absolute path.
    pub path: PathBuf,
}

/// A folder registered for recursive watching.
///
/// Identity-unique member of the watched set: two descriptors are the
/// same registration only when both path and excludes match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedFolder {
    /// Folder root.
    pub path: PathBuf,
    /// Glob patterns for paths whose events are dropped.
    pub excludes: Vec<String>,
}

impl WatchedFolder {
    /// Descriptor without excludes.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            excludes: Vec::new(),
        }
    }

    /// Descriptor with exclude patterns.
    pub fn with_excludes(path: impl Into<PathBuf>, excludes: Vec<String>) -> Self {
        Self {
            path: path.into(),
            excludes,
        }
    }
}

/// Open file handle.
///
/// Exclusively owned by the caller between `open` and `close`; the
/// provider keeps no handle table. An in-flight positioned read or
/// write holds its own reference to the file, so dropping the handle
/// never interrupts an OS call already underway.
#[derive(Debug)]
pub struct FileHandle {
    fd: u64,
    path: PathBuf,
    file: Arc<std::fs::File>,
    writable: bool,
}

impl FileHandle {
    pub(crate) fn new(file: std::fs::File, path: PathBuf, writable: bool) -> Self {
        #[cfg(unix)]
        let fd = {
            use std::os::unix::io::AsRawFd;
            file.as_raw_fd() as u64
        };
        #[cfg(windows)]
        let fd = {
            use std::os::windows::io::AsRawHandle;
            file.as_raw_handle() as u64
        };
        #[cfg(not(any(unix, windows)))]
        let fd = 0;

        Self {
            fd,
            path,
            file: Arc::new(file),
            writable,
        }
    }

    /// OS-level descriptor number, for diagnostics.
    pub fn fd(&self) -> u64 {
        self.fd
    }

    /// Path the handle was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the handle was opened for writing.
    pub fn writable(&self) -> bool {
        self.writable
    }

    pub(crate) fn file(&self) -> &Arc<std::fs::File> {
        &self.file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_rejects_relative_paths() {
        let err = Resource::file("relative/path.txt").unwrap_err();
        assert_eq!(err.code(), "Unknown");
        assert!(err.to_string().contains("not absolute"));
    }

    #[test]
    fn test_resource_accessors() {
        let r = Resource::file("/tmp/a.txt").unwrap();
        assert_eq!(r.scheme(), "file");
        assert_eq!(r.path(), Path::new("/tmp/a.txt"));
        assert_eq!(r.join("b").path(), Path::new("/tmp/a.txt/b"));
    }

    #[test]
    fn test_file_type_combines() {
        let link_to_dir = FileType::SYMBOLIC_LINK | FileType::DIRECTORY;
        let stat = Stat {
            file_type: link_to_dir,
            ctime_ms: 0,
            mtime_ms: 0,
            size: 0,
        };
        assert!(stat.is_directory());
        assert!(stat.is_symbolic_link());
        assert!(!stat.is_file());
    }

    #[test]
    fn test_stat_serde_roundtrip() {
        let stat = Stat {
            file_type: FileType::SYMBOLIC_LINK | FileType::FILE,
            ctime_ms: 1,
            mtime_ms: 2,
            size: 3,
        };
        let json = serde_json::to_string(&stat).unwrap();
        let back: Stat = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stat);

        let entry = DirEntry {
            name: "a.txt".into(),
            stat,
        };
        let json = serde_json::to_string(&entry).unwrap();
        let back: DirEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "a.txt");
        assert_eq!(back.stat, stat);
    }

    #[test]
    fn test_watched_folder_identity() {
        let a = WatchedFolder::new("/w");
        let b = WatchedFolder::with_excludes("/w", vec!["**/target/**".into()]);
        assert_ne!(a, b);
        assert_eq!(a, WatchedFolder::new("/w"));
    }
}
