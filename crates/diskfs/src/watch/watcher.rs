//! Watcher implementations.
//!
//! A closed set of variants shares one construction contract:
//! `(folders, on_change, on_error, verbose) -> instance with dispose`.
//! Change batches and errors leave through the handlers; a watcher
//! never throws after construction.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::types::{ChangeKind, FileChange, WatchedFolder};

/// Receives batches of change events.
pub type ChangeHandler = Arc<dyn Fn(Vec<FileChange>) + Send + Sync>;

/// Receives watcher failures as values.
pub type ErrorHandler = Arc<dyn Fn(WatcherError) + Send + Sync>;

/// A watcher failure, delivered out-of-band as a value.
#[derive(Debug, Clone)]
pub struct WatcherError {
    /// Human-readable description.
    pub message: String,
    /// Paths the failure relates to, when the backend reports them.
    pub paths: Vec<PathBuf>,
}

impl WatcherError {
    pub(crate) fn from_notify(err: notify::Error) -> Self {
        Self {
            message: err.to_string(),
            paths: err.paths,
        }
    }
}

impl std::fmt::Display for WatcherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// One watched root with its excludes compiled.
struct CompiledFolder {
    path: PathBuf,
    excludes: Vec<glob::Pattern>,
}

impl CompiledFolder {
    fn new(folder: &WatchedFolder) -> Self {
        let excludes = folder
            .excludes
            .iter()
            .filter_map(|raw| match glob::Pattern::new(raw) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    tracing::warn!(pattern = %raw, error = %err, "ignoring invalid exclude pattern");
                    None
                }
            })
            .collect();
        Self {
            path: folder.path.clone(),
            excludes,
        }
    }

    /// True when `path` lives under this root and matches an exclude.
    fn excludes(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.path) else {
            return false;
        };
        self.excludes
            .iter()
            .any(|p| p.matches_path(relative) || p.matches_path(path))
    }
}

fn compile(folders: &[WatchedFolder]) -> Vec<CompiledFolder> {
    folders.iter().map(CompiledFolder::new).collect()
}

fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

/// Convert a backend event into a change batch, dropping excluded paths.
fn to_changes(event: Event, folders: &[CompiledFolder]) -> Vec<FileChange> {
    let Some(kind) = change_kind(&event.kind) else {
        return Vec::new();
    };
    event
        .paths
        .into_iter()
        .filter(|path| !folders.iter().any(|f| f.excludes(path)))
        .map(|path| FileChange { kind, path })
        .collect()
}

fn forward(event: Event, folders: &[CompiledFolder], on_change: &ChangeHandler, verbose: bool) {
    let changes = to_changes(event, folders);
    if changes.is_empty() {
        return;
    }
    if verbose {
        tracing::trace!(count = changes.len(), "forwarding change batch");
    }
    on_change(changes);
}

/// Recursive watcher over exactly one folder.
///
/// The platform-specific variant: `notify` picks the native backend
/// (inotify, FSEvents, ReadDirectoryChangesW) for the single root.
/// Does not support reconfiguration; the coordinator replaces it.
pub struct SingleFolderWatcher {
    // Held for its Drop impl, which stops the backend.
    _watcher: RecommendedWatcher,
    folder: WatchedFolder,
}

impl SingleFolderWatcher {
    /// Construct and start watching `folder` recursively.
    pub fn new(
        folder: WatchedFolder,
        on_change: ChangeHandler,
        on_error: ErrorHandler,
        verbose: bool,
    ) -> Result<Self, notify::Error> {
        let compiled = compile(std::slice::from_ref(&folder));
        let errors = Arc::clone(&on_error);
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => forward(event, &compiled, &on_change, verbose),
                Err(err) => errors(WatcherError::from_notify(err)),
            },
            notify::Config::default(),
        )?;
        watcher.watch(&folder.path, RecursiveMode::Recursive)?;
        if verbose {
            tracing::debug!(path = %folder.path.display(), "started single-folder watcher");
        }
        Ok(Self {
            _watcher: watcher,
            folder,
        })
    }

    /// The watched folder.
    pub fn folder(&self) -> &WatchedFolder {
        &self.folder
    }

    /// Stop watching.
    pub fn dispose(self) {}
}

/// Recursive watcher over any number of folders.
///
/// The only variant that supports in-place reconfiguration: the
/// coordinator diffs the folder set against the running one and issues
/// watch/unwatch calls instead of recreating the backend.
pub struct MultiFolderWatcher {
    watcher: RecommendedWatcher,
    folders: Vec<WatchedFolder>,
    compiled: Arc<Mutex<Vec<CompiledFolder>>>,
    on_error: ErrorHandler,
    verbose: bool,
}

impl MultiFolderWatcher {
    /// Construct and start watching every folder recursively.
    ///
    /// A folder that cannot be watched (missing, unreadable) is
    /// reported through `on_error` and skipped; the watcher still
    /// starts for the rest.
    pub fn new(
        folders: Vec<WatchedFolder>,
        on_change: ChangeHandler,
        on_error: ErrorHandler,
        verbose: bool,
    ) -> Result<Self, notify::Error> {
        let compiled = Arc::new(Mutex::new(compile(&folders)));
        let callback_compiled = Arc::clone(&compiled);
        let errors = Arc::clone(&on_error);
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    let compiled = callback_compiled.lock();
                    forward(event, compiled.as_slice(), &on_change, verbose);
                }
                Err(err) => errors(WatcherError::from_notify(err)),
            },
            notify::Config::default(),
        )?;

        for folder in &folders {
            if let Err(err) = watcher.watch(&folder.path, RecursiveMode::Recursive) {
                on_error(WatcherError::from_notify(err));
            }
        }
        if verbose {
            tracing::debug!(count = folders.len(), "started multi-folder watcher");
        }

        Ok(Self {
            watcher,
            folders,
            compiled,
            on_error,
            verbose,
        })
    }

    /// Currently watched folders.
    pub fn folders(&self) -> &[WatchedFolder] {
        &self.folders
    }

    /// Replace the watched set without recreating the backend.
    pub fn reconfigure(&mut self, folders: Vec<WatchedFolder>) {
        for removed in self.folders.iter().filter(|f| !folders.contains(f)) {
            // Unwatch failures are expected when the folder vanished.
            let _ = self.watcher.unwatch(&removed.path);
        }
        for added in folders.iter().filter(|f| !self.folders.contains(f)) {
            if let Err(err) = self.watcher.watch(&added.path, RecursiveMode::Recursive) {
                (self.on_error)(WatcherError::from_notify(err));
            }
        }
        *self.compiled.lock() = compile(&folders);
        if self.verbose {
            tracing::debug!(count = folders.len(), "reconfigured multi-folder watcher");
        }
        self.folders = folders;
    }

    /// Stop watching.
    pub fn dispose(self) {}
}

/// Independent non-recursive watcher over a single resource.
///
/// Created immediately on request, never pooled, and owned by its
/// caller; dropping it stops the watch.
pub struct NonRecursiveWatcher {
    // Held for its Drop impl, which stops the backend.
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl NonRecursiveWatcher {
    /// Construct and start watching `path` non-recursively.
    pub fn new(
        path: PathBuf,
        on_change: ChangeHandler,
        on_error: ErrorHandler,
        verbose: bool,
    ) -> Result<Self, notify::Error> {
        let errors = Arc::clone(&on_error);
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => forward(event, &[], &on_change, verbose),
                Err(err) => errors(WatcherError::from_notify(err)),
            },
            notify::Config::default(),
        )?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;
        if verbose {
            tracing::debug!(path = %path.display(), "started non-recursive watcher");
        }
        Ok(Self {
            _watcher: watcher,
            path,
        })
    }

    /// The watched path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop watching.
    pub fn dispose(self) {}
}
