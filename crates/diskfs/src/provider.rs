//! Provider operations trait.
//!
//! One capability-flagged interface over a filesystem, so hosts can
//! manipulate files without knowing whether the resource is local,
//! remote, or virtual. The local-disk implementation lives in
//! [`crate::DiskFileSystemProvider`].

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::FsResult;
use crate::types::{
    DeleteOptions, DirEntry, FileChange, FileHandle, OpenOptions, OverwriteOptions, Resource,
    Stat, WatchedFolder, WriteOptions,
};
use crate::types::Capabilities;
use crate::watch::{NonRecursiveWatcher, RecursiveWatcherState, WatcherError};

/// Filesystem operations behind capability flags.
///
/// Every operation is asynchronous and reports failures exclusively as
/// normalized [`FsError`](crate::FsError) values. Independent
/// operations may interleave; concurrent mutations on the same
/// resource are the caller's responsibility to order.
#[async_trait]
pub trait FileSystemProvider: Send + Sync {
    /// Capability bitmask, fixed for the instance's lifetime.
    fn capabilities(&self) -> Capabilities;

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Stat a resource without silently following symbolic links.
    async fn stat(&self, resource: &Resource) -> FsResult<Stat>;

    /// List a directory, independently stating each entry.
    ///
    /// An entry whose stat fails is logged and omitted; the call fails
    /// only when the listing itself does.
    async fn read_dir(&self, resource: &Resource) -> FsResult<Vec<DirEntry>>;

    // ========================================================================
    // Content
    // ========================================================================

    /// Read the whole file.
    async fn read_file(&self, resource: &Resource) -> FsResult<Vec<u8>>;

    /// Write the whole file, validating existence against the flags
    /// before any byte is written.
    async fn write_file(
        &self,
        resource: &Resource,
        content: &[u8],
        options: WriteOptions,
    ) -> FsResult<()>;

    /// Open a handle: write-truncate-create when `create` is set,
    /// read-only otherwise.
    async fn open(&self, resource: &Resource, options: OpenOptions) -> FsResult<FileHandle>;

    /// Release a handle, syncing written data.
    async fn close(&self, handle: FileHandle) -> FsResult<()>;

    /// Read up to `len` bytes at the explicit byte offset `pos`.
    ///
    /// No cursor state is kept; the returned buffer holds the bytes
    /// actually transferred.
    async fn read(&self, handle: &FileHandle, pos: u64, len: usize) -> FsResult<Vec<u8>>;

    /// Write `data` at the explicit byte offset `pos`, returning the
    /// number of bytes actually transferred.
    async fn write(&self, handle: &FileHandle, pos: u64, data: &[u8]) -> FsResult<usize>;

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Create a single directory level.
    async fn mkdir(&self, resource: &Resource) -> FsResult<()>;

    /// Delete a resource.
    async fn delete(&self, resource: &Resource, options: DeleteOptions) -> FsResult<()>;

    /// Move a resource, validating the target before touching the OS.
    async fn rename(
        &self,
        from: &Resource,
        to: &Resource,
        options: OverwriteOptions,
    ) -> FsResult<()>;

    /// Copy a resource (recursively for folders), validating the
    /// target before touching the OS.
    async fn copy(&self, from: &Resource, to: &Resource, options: OverwriteOptions)
        -> FsResult<()>;

    // ========================================================================
    // Watching
    // ========================================================================

    /// Watch one resource non-recursively.
    ///
    /// The watcher is created immediately and returned to the caller,
    /// who owns its lifetime; it is never pooled and survives provider
    /// dispose.
    fn watch(&self, resource: &Resource) -> FsResult<NonRecursiveWatcher>;

    /// Register a folder for recursive watching; returns the
    /// registration id.
    fn watch_recursive(&self, folder: WatchedFolder) -> u64;

    /// Remove a recursive watch registration.
    fn unwatch_recursive(&self, id: u64);

    /// State of the shared recursive watcher, for diagnostics.
    fn recursive_watcher_state(&self) -> RecursiveWatcherState;

    /// Subscribe to change batches from all watchers.
    fn subscribe_changes(&self) -> broadcast::Receiver<Vec<FileChange>>;

    /// Subscribe to watcher errors, delivered as values rather than
    /// operation failures.
    fn subscribe_errors(&self) -> broadcast::Receiver<WatcherError>;

    /// Dispose the provider: tears down the active recursive watcher.
    fn dispose(&self);

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a resource exists.
    async fn exists(&self, resource: &Resource) -> bool {
        self.stat(resource).await.is_ok()
    }
}
