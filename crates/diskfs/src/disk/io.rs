//! Content and descriptor I/O for the disk provider.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::task;

use super::DiskFileSystemProvider;
use crate::error::{FsError, FsResult};
use crate::types::{FileHandle, OpenOptions};

const WRITE_RETRY_ATTEMPTS: u32 = 3;
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(100);

fn join_error(err: task::JoinError) -> FsError {
    FsError::unknown(format!("background I/O task failed: {err}"))
}

#[cfg(unix)]
fn positioned_read(file: &std::fs::File, buf: &mut [u8], pos: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, pos)
}

#[cfg(windows)]
fn positioned_read(file: &std::fs::File, buf: &mut [u8], pos: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, pos)
}

#[cfg(not(any(unix, windows)))]
fn positioned_read(_file: &std::fs::File, _buf: &mut [u8], _pos: u64) -> io::Result<usize> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "positioned reads are not supported on this platform",
    ))
}

#[cfg(unix)]
fn positioned_write(file: &std::fs::File, data: &[u8], pos: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(data, pos)
}

#[cfg(windows)]
fn positioned_write(file: &std::fs::File, data: &[u8], pos: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_write(data, pos)
}

#[cfg(not(any(unix, windows)))]
fn positioned_write(_file: &std::fs::File, _data: &[u8], _pos: u64) -> io::Result<usize> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "positioned writes are not supported on this platform",
    ))
}

impl DiskFileSystemProvider {
    /// Write `content` to `path` after the flag validation has passed.
    pub(super) async fn write_file_contents(
        &self,
        path: &Path,
        content: &[u8],
        target_exists: bool,
    ) -> FsResult<()> {
        if cfg!(windows) && target_exists {
            return self.write_preserving_streams(path, content).await;
        }
        fs::write(path, content)
            .await
            .map_err(|e| FsError::from_io(e, path))
    }

    /// Overwrite without replacing the underlying file.
    ///
    /// NTFS drops alternate data streams when a file is re-created, so
    /// an existing target is truncated first and then reopened for an
    /// update write. An external watcher can grab the file right after
    /// the truncate, which makes the reopen-write step fail
    /// transiently; it is retried with a fixed delay. A failing
    /// truncate falls back to a direct overwrite.
    pub(super) async fn write_preserving_streams(
        &self,
        path: &Path,
        content: &[u8],
    ) -> FsResult<()> {
        let truncated = match fs::OpenOptions::new().write(true).open(path).await {
            Ok(file) => file.set_len(0).await,
            Err(err) => Err(err),
        };
        if let Err(err) = truncated {
            tracing::debug!(
                path = %path.display(),
                error = %err,
                "truncate failed, overwriting directly"
            );
            return fs::write(path, content)
                .await
                .map_err(|e| FsError::from_io(e, path));
        }

        let mut last_error: Option<io::Error> = None;
        for attempt in 0..WRITE_RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(WRITE_RETRY_DELAY).await;
            }
            match update_write(path, content).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::debug!(
                        path = %path.display(),
                        attempt,
                        error = %err,
                        "post-truncate write failed"
                    );
                    last_error = Some(err);
                }
            }
        }
        let err = last_error.unwrap_or_else(|| io::Error::other("truncate-then-write failed"));
        Err(FsError::from_io(err, path))
    }

    pub(super) async fn open_handle(
        &self,
        path: &Path,
        options: OpenOptions,
    ) -> FsResult<FileHandle> {
        let owned = path.to_path_buf();
        let writable = options.create;
        let opened = task::spawn_blocking(move || {
            if writable {
                std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&owned)
            } else {
                std::fs::File::open(&owned)
            }
        })
        .await
        .map_err(join_error)?;

        let file = opened.map_err(|e| FsError::from_io(e, path))?;
        Ok(FileHandle::new(file, path.to_path_buf(), writable))
    }

    pub(super) async fn close_handle(&self, handle: FileHandle) -> FsResult<()> {
        if handle.writable() {
            let file = Arc::clone(handle.file());
            let synced = task::spawn_blocking(move || file.sync_all())
                .await
                .map_err(join_error)?;
            synced.map_err(|e| FsError::from_io(e, handle.path()))?;
        }
        // Dropping the last reference closes the descriptor; an
        // in-flight positioned read or write holds its own reference
        // and runs to completion.
        drop(handle);
        Ok(())
    }

    pub(super) async fn read_handle(
        &self,
        handle: &FileHandle,
        pos: u64,
        len: usize,
    ) -> FsResult<Vec<u8>> {
        let file = Arc::clone(handle.file());
        let read = task::spawn_blocking(move || {
            let mut buffer = vec![0u8; len];
            let transferred = positioned_read(&file, &mut buffer, pos)?;
            buffer.truncate(transferred);
            Ok::<_, io::Error>(buffer)
        })
        .await
        .map_err(join_error)?;
        read.map_err(|e| FsError::from_io(e, handle.path()))
    }

    pub(super) async fn write_handle(
        &self,
        handle: &FileHandle,
        pos: u64,
        data: &[u8],
    ) -> FsResult<usize> {
        if !handle.writable() {
            return Err(FsError::no_permissions(format!(
                "handle not opened for writing: {}",
                handle.path().display()
            )));
        }
        let file = Arc::clone(handle.file());
        let owned = data.to_vec();
        let written = task::spawn_blocking(move || positioned_write(&file, &owned, pos))
            .await
            .map_err(join_error)?;
        written.map_err(|e| FsError::from_io(e, handle.path()))
    }
}

async fn update_write(path: &Path, content: &[u8]) -> io::Result<()> {
    // Update write: no create, no truncate, so the file object the OS
    // already holds (and its metadata streams) stays in place.
    let mut file = fs::OpenOptions::new().write(true).open(path).await?;
    file.write_all(content).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use crate::provider::FileSystemProvider;
    use crate::types::{OpenOptions, Resource, WriteOptions};
    use crate::DiskFileSystemProvider;
    use tempfile::TempDir;

    fn setup() -> (DiskFileSystemProvider, TempDir) {
        (DiskFileSystemProvider::new(), TempDir::new().unwrap())
    }

    fn res(dir: &TempDir, name: &str) -> Resource {
        Resource::file(dir.path().join(name)).unwrap()
    }

    #[tokio::test]
    async fn test_descriptor_roundtrip_with_offsets() {
        let (provider, dir) = setup();
        let file = res(&dir, "data.bin");

        let handle = provider
            .open(&file, OpenOptions { create: true })
            .await
            .unwrap();
        assert!(handle.writable());
        assert_eq!(provider.write(&handle, 0, b"hello").await.unwrap(), 5);
        assert_eq!(provider.write(&handle, 5, b" world").await.unwrap(), 6);
        provider.close(handle).await.unwrap();

        assert_eq!(provider.read_file(&file).await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_positioned_read_has_no_cursor() {
        let (provider, dir) = setup();
        let file = res(&dir, "data.bin");
        provider
            .write_file(&file, b"0123456789", WriteOptions { create: true, overwrite: true })
            .await
            .unwrap();

        let handle = provider.open(&file, OpenOptions::default()).await.unwrap();
        // Reads at explicit offsets, in arbitrary order.
        assert_eq!(provider.read(&handle, 5, 3).await.unwrap(), b"567");
        assert_eq!(provider.read(&handle, 0, 4).await.unwrap(), b"0123");
        // Past the end transfers nothing.
        assert!(provider.read(&handle, 100, 8).await.unwrap().is_empty());
        provider.close(handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_on_readonly_handle_is_rejected() {
        let (provider, dir) = setup();
        let file = res(&dir, "ro.txt");
        provider
            .write_file(&file, b"x", WriteOptions { create: true, overwrite: true })
            .await
            .unwrap();

        let handle = provider.open(&file, OpenOptions::default()).await.unwrap();
        let err = provider.write(&handle, 0, b"y").await.unwrap_err();
        assert_eq!(err.code(), "NoPermissions");
        provider.close(handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_missing_readonly_fails_not_found() {
        let (provider, dir) = setup();
        let err = provider
            .open(&res(&dir, "absent.txt"), OpenOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FileNotFound");
    }

    #[tokio::test]
    async fn test_open_create_truncates_existing() {
        let (provider, dir) = setup();
        let file = res(&dir, "t.txt");
        provider
            .write_file(&file, b"previous content", WriteOptions { create: true, overwrite: true })
            .await
            .unwrap();

        let handle = provider
            .open(&file, OpenOptions { create: true })
            .await
            .unwrap();
        provider.close(handle).await.unwrap();
        assert!(provider.read_file(&file).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_preserving_write_replaces_content() {
        let (provider, dir) = setup();
        let file = res(&dir, "streams.txt");
        provider
            .write_file(&file, b"old old old", WriteOptions { create: true, overwrite: true })
            .await
            .unwrap();

        provider
            .write_preserving_streams(file.path(), b"new")
            .await
            .unwrap();
        assert_eq!(provider.read_file(&file).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_preserving_write_falls_back_when_truncate_fails() {
        let (provider, dir) = setup();
        let file = res(&dir, "fresh.txt");

        // No file to truncate: the fallback direct overwrite creates it.
        provider
            .write_preserving_streams(file.path(), b"content")
            .await
            .unwrap();
        assert_eq!(provider.read_file(&file).await.unwrap(), b"content");
    }
}
