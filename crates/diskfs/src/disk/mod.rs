//! Local-disk provider.
//!
//! Acts directly on the host filesystem. Every failure leaves through
//! [`FsError::from_io`], and target-state validation happens before
//! any mutating OS call.

mod io;

use async_trait::async_trait;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::SystemTime;
use tokio::fs;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{FsError, FsResult};
use crate::provider::FileSystemProvider;
use crate::types::{
    Capabilities, DeleteOptions, DirEntry, FileChange, FileHandle, FileType, OpenOptions,
    OverwriteOptions, Resource, Stat, WatchedFolder, WriteOptions,
};
use crate::watch::{NonRecursiveWatcher, RecursiveWatcherState, WatchCoordinator, WatcherError};

/// Provider for `file` resources on the local disk.
pub struct DiskFileSystemProvider {
    capabilities: Capabilities,
    case_sensitive: bool,
    watches: WatchCoordinator,
}

impl DiskFileSystemProvider {
    /// Provider with platform defaults.
    pub fn new() -> Self {
        Self::with_options(default_case_sensitivity(), false)
    }

    /// Provider with explicit path case sensitivity, for filesystems
    /// that differ from the platform default.
    pub fn with_case_sensitivity(case_sensitive: bool) -> Self {
        Self::with_options(case_sensitive, false)
    }

    /// Full construction: case sensitivity plus verbose watcher
    /// diagnostics.
    pub fn with_options(case_sensitive: bool, verbose: bool) -> Self {
        let mut capabilities = Capabilities::FILE_READ_WRITE
            | Capabilities::FILE_OPEN_READ_WRITE_CLOSE
            | Capabilities::FILE_FOLDER_COPY;
        if case_sensitive {
            capabilities |= Capabilities::PATH_CASE_SENSITIVE;
        }
        Self {
            capabilities,
            case_sensitive,
            watches: WatchCoordinator::new(verbose),
        }
    }

    /// True when `to` differs from `from` only in letter case on a
    /// case-insensitive provider.
    fn is_case_variant(&self, from: &Path, to: &Path) -> bool {
        if self.case_sensitive || from == to {
            return false;
        }
        from.to_string_lossy().to_lowercase() == to.to_string_lossy().to_lowercase()
    }

    /// Target-state validation shared by rename and copy.
    async fn validate_move_copy_target(
        &self,
        from: &Resource,
        to: &Resource,
        overwrite: bool,
    ) -> FsResult<()> {
        if to.path().starts_with(from.path()) && to.path() != from.path() {
            return Err(FsError::unknown(format!(
                "unable to move/copy '{}' into a child of itself",
                from.path().display()
            )));
        }

        // A pure case rename on a case-insensitive filesystem resolves
        // the target path to the source itself; it does not count as
        // an occupied target.
        if self.is_case_variant(from.path(), to.path()) {
            return Ok(());
        }

        if fs::symlink_metadata(to.path()).await.is_ok() {
            if !overwrite {
                return Err(FsError::file_exists(format!(
                    "target already exists: {}",
                    to.path().display()
                )));
            }
            self.delete(
                to,
                DeleteOptions {
                    recursive: true,
                    use_trash: false,
                },
            )
            .await?;
        }
        Ok(())
    }

    /// Recursive removal via move-to-temp: renaming the tree aside
    /// first keeps busy handles and large trees from leaving a
    /// half-deleted target at the original path.
    async fn delete_recursive(&self, path: &Path) -> FsResult<()> {
        let staged = std::env::temp_dir().join(format!("diskfs-{}", Uuid::new_v4().simple()));
        match fs::rename(path, &staged).await {
            Ok(()) => {
                if let Err(err) = remove_any(&staged).await {
                    // The tree is gone from its original path; a
                    // failure here only leaks temp space.
                    tracing::warn!(
                        path = %staged.display(),
                        error = %err,
                        "failed to remove staged delete target"
                    );
                }
                Ok(())
            }
            // The rename into temp fails across devices or mount
            // points; remove in place instead.
            Err(_) => remove_any(path)
                .await
                .map_err(|e| FsError::from_io(e, path)),
        }
    }
}

impl Default for DiskFileSystemProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemProvider for DiskFileSystemProvider {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn stat(&self, resource: &Resource) -> FsResult<Stat> {
        let path = resource.path();
        let link_meta = fs::symlink_metadata(path)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        Ok(stat_record(path, link_meta).await)
    }

    async fn read_dir(&self, resource: &Resource) -> FsResult<Vec<DirEntry>> {
        let path = resource.path();
        let mut dir = fs::read_dir(path)
            .await
            .map_err(|e| FsError::from_io(e, path))?;

        let mut entries = Vec::new();
        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => return Err(FsError::from_io(err, path)),
            };
            let child = entry.path();
            match fs::symlink_metadata(&child).await {
                Ok(meta) => entries.push(DirEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    stat: stat_record(&child, meta).await,
                }),
                // Partial-result policy: an unreadable child is
                // dropped, the listing survives.
                Err(err) => tracing::warn!(
                    path = %child.display(),
                    error = %err,
                    "skipping unreadable directory entry"
                ),
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn read_file(&self, resource: &Resource) -> FsResult<Vec<u8>> {
        let path = resource.path();
        fs::read(path).await.map_err(|e| FsError::from_io(e, path))
    }

    async fn write_file(
        &self,
        resource: &Resource,
        content: &[u8],
        options: WriteOptions,
    ) -> FsResult<()> {
        let path = resource.path();
        let target_exists = fs::symlink_metadata(path).await.is_ok();
        if target_exists && !options.overwrite {
            return Err(FsError::file_exists(format!(
                "file already exists: {}",
                path.display()
            )));
        }
        if !target_exists && !options.create {
            return Err(FsError::file_not_found(format!(
                "file does not exist: {}",
                path.display()
            )));
        }
        self.write_file_contents(path, content, target_exists).await
    }

    async fn open(&self, resource: &Resource, options: OpenOptions) -> FsResult<FileHandle> {
        self.open_handle(resource.path(), options).await
    }

    async fn close(&self, handle: FileHandle) -> FsResult<()> {
        self.close_handle(handle).await
    }

    async fn read(&self, handle: &FileHandle, pos: u64, len: usize) -> FsResult<Vec<u8>> {
        self.read_handle(handle, pos, len).await
    }

    async fn write(&self, handle: &FileHandle, pos: u64, data: &[u8]) -> FsResult<usize> {
        self.write_handle(handle, pos, data).await
    }

    async fn mkdir(&self, resource: &Resource) -> FsResult<()> {
        let path = resource.path();
        fs::create_dir(path)
            .await
            .map_err(|e| FsError::from_io(e, path))
    }

    async fn delete(&self, resource: &Resource, options: DeleteOptions) -> FsResult<()> {
        if options.use_trash {
            return Err(FsError::unknown(
                "trash is not supported by the local disk provider",
            ));
        }
        let path = resource.path();
        let meta = fs::symlink_metadata(path)
            .await
            .map_err(|e| FsError::from_io(e, path))?;

        if options.recursive {
            self.delete_recursive(path).await
        } else {
            // Non-recursive removal targets exactly one non-directory
            // entry.
            if meta.is_dir() {
                return Err(FsError::file_is_a_directory(format!(
                    "cannot delete directory without recursive: {}",
                    path.display()
                )));
            }
            fs::remove_file(path)
                .await
                .map_err(|e| FsError::from_io(e, path))
        }
    }

    async fn rename(
        &self,
        from: &Resource,
        to: &Resource,
        options: OverwriteOptions,
    ) -> FsResult<()> {
        if from.path() == to.path() {
            return Ok(());
        }
        self.validate_move_copy_target(from, to, options.overwrite)
            .await?;
        fs::rename(from.path(), to.path())
            .await
            .map_err(|e| FsError::from_move_copy_io(e, from.path(), to.path()))
    }

    async fn copy(
        &self,
        from: &Resource,
        to: &Resource,
        options: OverwriteOptions,
    ) -> FsResult<()> {
        if from.path() == to.path() {
            return Ok(());
        }
        self.validate_move_copy_target(from, to, options.overwrite)
            .await?;
        copy_tree(from.path().to_path_buf(), to.path().to_path_buf())
            .await
            .map_err(|e| FsError::from_move_copy_io(e, from.path(), to.path()))
    }

    fn watch(&self, resource: &Resource) -> FsResult<NonRecursiveWatcher> {
        self.watches
            .watch_non_recursive(resource.path().to_path_buf())
            .map_err(|err| {
                FsError::unknown(format!(
                    "failed to watch {}: {}",
                    resource.path().display(),
                    err
                ))
            })
    }

    fn watch_recursive(&self, folder: WatchedFolder) -> u64 {
        self.watches.register(folder)
    }

    fn unwatch_recursive(&self, id: u64) {
        self.watches.unregister(id)
    }

    fn recursive_watcher_state(&self) -> RecursiveWatcherState {
        self.watches.state()
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<Vec<FileChange>> {
        self.watches.subscribe_changes()
    }

    fn subscribe_errors(&self) -> broadcast::Receiver<WatcherError> {
        self.watches.subscribe_errors()
    }

    fn dispose(&self) {
        self.watches.dispose()
    }
}

fn default_case_sensitivity() -> bool {
    // macOS and Windows default to case-insensitive filesystems;
    // Linux and the other Unixes are case sensitive.
    !(cfg!(target_os = "macos") || cfg!(windows))
}

fn entry_kind(meta: &std::fs::Metadata) -> FileType {
    if meta.is_dir() {
        FileType::DIRECTORY
    } else {
        FileType::FILE
    }
}

fn epoch_ms(time: std::io::Result<SystemTime>) -> u64 {
    time.ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn record(file_type: FileType, meta: &std::fs::Metadata) -> Stat {
    Stat {
        file_type,
        ctime_ms: epoch_ms(meta.created()),
        mtime_ms: epoch_ms(meta.modified()),
        size: meta.len(),
    }
}

/// Build the stat record from link-aware metadata.
///
/// A symlink reports `SYMBOLIC_LINK` combined with the kind of its
/// target when the target resolves; a dangling link reports the bare
/// flag with the link's own metadata.
async fn stat_record(path: &Path, link_meta: std::fs::Metadata) -> Stat {
    if !link_meta.file_type().is_symlink() {
        return record(entry_kind(&link_meta), &link_meta);
    }
    match fs::metadata(path).await {
        Ok(target) => record(FileType::SYMBOLIC_LINK | entry_kind(&target), &target),
        Err(_) => record(FileType::SYMBOLIC_LINK, &link_meta),
    }
}

async fn remove_any(path: &Path) -> std::io::Result<()> {
    let meta = fs::symlink_metadata(path).await?;
    if meta.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    }
}

/// Recursively copy a tree; symlinks are re-created as links.
fn copy_tree(
    from: PathBuf,
    to: PathBuf,
) -> Pin<Box<dyn Future<Output = std::io::Result<()>> + Send>> {
    Box::pin(async move {
        let meta = fs::symlink_metadata(&from).await?;
        let file_type = meta.file_type();
        if file_type.is_symlink() {
            let target = fs::read_link(&from).await?;
            copy_symlink(&target, &from, &to).await
        } else if file_type.is_dir() {
            fs::create_dir(&to).await?;
            let mut dir = fs::read_dir(&from).await?;
            while let Some(entry) = dir.next_entry().await? {
                copy_tree(entry.path(), to.join(entry.file_name())).await?;
            }
            Ok(())
        } else {
            fs::copy(&from, &to).await.map(|_| ())
        }
    })
}

#[cfg(unix)]
async fn copy_symlink(target: &Path, _from: &Path, to: &Path) -> std::io::Result<()> {
    fs::symlink(target, to).await
}

#[cfg(windows)]
async fn copy_symlink(target: &Path, from: &Path, to: &Path) -> std::io::Result<()> {
    // The link kind follows what the source link resolves to.
    match fs::metadata(from).await {
        Ok(meta) if meta.is_dir() => fs::symlink_dir(target, to).await,
        _ => fs::symlink_file(target, to).await,
    }
}

#[cfg(not(any(unix, windows)))]
async fn copy_symlink(_target: &Path, _from: &Path, _to: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}
