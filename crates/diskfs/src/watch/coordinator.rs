//! Recursive watch coordination.
//!
//! Any number of folders may be registered, but at most one recursive
//! watcher is alive at a time. Registrations mutate the folder set
//! synchronously and schedule a coalesced recomputation; bursts of
//! register/unregister collapse into a single watcher transition.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::trigger::CoalescingTrigger;
use super::watcher::{
    ChangeHandler, ErrorHandler, MultiFolderWatcher, NonRecursiveWatcher, SingleFolderWatcher,
    WatcherError,
};
use crate::types::{FileChange, WatchedFolder};

const CHANGE_CHANNEL_CAPACITY: usize = 256;
const ERROR_CHANNEL_CAPACITY: usize = 64;

/// State over the set of recursively watched folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecursiveWatcherState {
    /// No active watcher.
    Empty,
    /// One folder watched by the platform-specific watcher.
    SingleFolderActive,
    /// The reconfigurable multi-folder watcher is running.
    MultiFolderActive,
}

enum ActiveWatcher {
    None,
    Single(SingleFolderWatcher),
    Multi(MultiFolderWatcher),
}

struct Shared {
    /// Registered folders by registration id. Mutated synchronously;
    /// recomputation only ever reads a completed set.
    folders: Mutex<HashMap<u64, WatchedFolder>>,
    active: Mutex<ActiveWatcher>,
    /// Counts watcher creations, for diagnostics.
    generation: AtomicU64,
    disposed: Mutex<bool>,
    changes_tx: broadcast::Sender<Vec<FileChange>>,
    errors_tx: broadcast::Sender<WatcherError>,
    verbose: bool,
}

/// Owns the single shared recursive watcher and republishes events
/// from every watcher on two broadcast streams.
pub struct WatchCoordinator {
    shared: Arc<Shared>,
    next_id: AtomicU64,
    trigger: CoalescingTrigger,
}

impl WatchCoordinator {
    /// Create an empty coordinator.
    pub fn new(verbose: bool) -> Self {
        let (changes_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (errors_tx, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                folders: Mutex::new(HashMap::new()),
                active: Mutex::new(ActiveWatcher::None),
                generation: AtomicU64::new(0),
                disposed: Mutex::new(false),
                changes_tx,
                errors_tx,
                verbose,
            }),
            next_id: AtomicU64::new(1),
            trigger: CoalescingTrigger::new(),
        }
    }

    /// Subscribe to change batches from all watchers.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<Vec<FileChange>> {
        self.shared.changes_tx.subscribe()
    }

    /// Subscribe to watcher errors, delivered as values.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<WatcherError> {
        self.shared.errors_tx.subscribe()
    }

    /// Register a folder for recursive watching.
    ///
    /// Returns a registration id for [`unregister`](Self::unregister).
    /// The watcher transition happens on the next tick; rapid bursts
    /// of registrations collapse into one transition.
    pub fn register(&self, folder: WatchedFolder) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared.folders.lock().insert(id, folder);
        self.schedule_recompute();
        id
    }

    /// Remove a registration. Unknown ids are ignored.
    pub fn unregister(&self, id: u64) {
        self.shared.folders.lock().remove(&id);
        self.schedule_recompute();
    }

    /// Create an independent non-recursive watcher for one resource.
    ///
    /// No debounce: the watcher starts immediately and is returned to
    /// the caller, who owns its lifetime. Its events still land on the
    /// shared streams.
    pub fn watch_non_recursive(&self, path: PathBuf) -> Result<NonRecursiveWatcher, notify::Error> {
        NonRecursiveWatcher::new(
            path,
            Self::change_handler(&self.shared),
            Self::error_handler(&self.shared),
            self.shared.verbose,
        )
    }

    /// Current state of the shared recursive watcher.
    pub fn state(&self) -> RecursiveWatcherState {
        match *self.shared.active.lock() {
            ActiveWatcher::None => RecursiveWatcherState::Empty,
            ActiveWatcher::Single(_) => RecursiveWatcherState::SingleFolderActive,
            ActiveWatcher::Multi(_) => RecursiveWatcherState::MultiFolderActive,
        }
    }

    /// Number of watcher creations so far, for diagnostics.
    pub fn watcher_generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Relaxed)
    }

    /// Dispose the active recursive watcher and stop reacting to
    /// registrations. Non-recursive watchers remain with their callers.
    pub fn dispose(&self) {
        *self.shared.disposed.lock() = true;
        *self.shared.active.lock() = ActiveWatcher::None;
    }

    fn schedule_recompute(&self) {
        let shared = Arc::clone(&self.shared);
        self.trigger.schedule(move || Self::recompute(&shared));
    }

    fn change_handler(shared: &Arc<Shared>) -> ChangeHandler {
        let tx = shared.changes_tx.clone();
        Arc::new(move |changes| {
            // No receivers is fine; events are simply dropped.
            let _ = tx.send(changes);
        })
    }

    fn error_handler(shared: &Arc<Shared>) -> ErrorHandler {
        let tx = shared.errors_tx.clone();
        Arc::new(move |error| {
            tracing::error!(error = %error, "file watcher error");
            let _ = tx.send(error);
        })
    }

    /// Recompute the active watcher from the current folder set.
    ///
    /// The trigger guarantees runs never overlap, so this is the only
    /// code mutating `active` outside of dispose.
    fn recompute(shared: &Arc<Shared>) {
        // Identity-unique set: duplicate descriptors from separate
        // registrations watch once.
        let mut folders = Vec::new();
        for folder in shared.folders.lock().values() {
            if !folders.contains(folder) {
                folders.push(folder.clone());
            }
        }

        let mut active = shared.active.lock();

        // Checked under the active lock: a dispose that lands between
        // the scheduling of this run and the lock acquisition must not
        // have a fresh watcher installed over it. Dispose sets the flag
        // before it clears `active`, so seeing it unset here means any
        // concurrent dispose will still take the lock and clear
        // whatever this run installs.
        if *shared.disposed.lock() {
            return;
        }

        if folders.is_empty() {
            if !matches!(*active, ActiveWatcher::None) {
                tracing::debug!("stopping recursive watcher, no folders registered");
            }
            *active = ActiveWatcher::None;
            return;
        }

        // The multi-folder watcher is the sole reuse case: reconfigure
        // it in place instead of a dispose/recreate cycle.
        if let ActiveWatcher::Multi(watcher) = &mut *active {
            watcher.reconfigure(folders);
            return;
        }

        let on_change = Self::change_handler(shared);
        let on_error = Self::error_handler(shared);

        *active = ActiveWatcher::None;
        let next = if folders.len() == 1 {
            let folder = folders.remove(0);
            SingleFolderWatcher::new(folder, on_change, on_error.clone(), shared.verbose)
                .map(ActiveWatcher::Single)
        } else {
            MultiFolderWatcher::new(folders, on_change, on_error.clone(), shared.verbose)
                .map(ActiveWatcher::Multi)
        };

        match next {
            Ok(watcher) => {
                shared.generation.fetch_add(1, Ordering::Relaxed);
                *active = watcher;
            }
            Err(err) => {
                on_error(WatcherError::from_notify(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_starts_empty() {
        let coordinator = WatchCoordinator::new(false);
        assert_eq!(coordinator.state(), RecursiveWatcherState::Empty);
        assert_eq!(coordinator.watcher_generation(), 0);
    }

    #[tokio::test]
    async fn test_single_then_multi_folder() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let coordinator = WatchCoordinator::new(false);

        coordinator.register(WatchedFolder::new(dir_a.path()));
        settle().await;
        assert_eq!(coordinator.state(), RecursiveWatcherState::SingleFolderActive);
        assert_eq!(coordinator.watcher_generation(), 1);

        coordinator.register(WatchedFolder::new(dir_b.path()));
        settle().await;
        assert_eq!(coordinator.state(), RecursiveWatcherState::MultiFolderActive);
        assert_eq!(coordinator.watcher_generation(), 2);
    }

    #[tokio::test]
    async fn test_multi_folder_reconfigures_in_place() {
        let dirs: Vec<TempDir> = (0..3).map(|_| TempDir::new().unwrap()).collect();
        let coordinator = WatchCoordinator::new(false);

        let mut ids = Vec::new();
        for dir in &dirs[..2] {
            ids.push(coordinator.register(WatchedFolder::new(dir.path())));
        }
        settle().await;
        assert_eq!(coordinator.state(), RecursiveWatcherState::MultiFolderActive);
        let generation = coordinator.watcher_generation();

        // Growing and shrinking the set reuses the running watcher.
        let third = coordinator.register(WatchedFolder::new(dirs[2].path()));
        settle().await;
        assert_eq!(coordinator.watcher_generation(), generation);

        coordinator.unregister(third);
        coordinator.unregister(ids[1]);
        settle().await;
        assert_eq!(coordinator.state(), RecursiveWatcherState::MultiFolderActive);
        assert_eq!(coordinator.watcher_generation(), generation);
    }

    #[tokio::test]
    async fn test_unregister_all_stops_watching() {
        let dir = TempDir::new().unwrap();
        let coordinator = WatchCoordinator::new(false);

        let id = coordinator.register(WatchedFolder::new(dir.path()));
        settle().await;
        coordinator.unregister(id);
        settle().await;
        assert_eq!(coordinator.state(), RecursiveWatcherState::Empty);
    }

    #[tokio::test]
    async fn test_register_unregister_within_debounce_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let coordinator = WatchCoordinator::new(false);

        let id = coordinator.register(WatchedFolder::new(dir.path()));
        coordinator.unregister(id);
        settle().await;

        assert_eq!(coordinator.state(), RecursiveWatcherState::Empty);
        assert_eq!(coordinator.watcher_generation(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_descriptors_watch_once() {
        let dir = TempDir::new().unwrap();
        let coordinator = WatchCoordinator::new(false);

        coordinator.register(WatchedFolder::new(dir.path()));
        coordinator.register(WatchedFolder::new(dir.path()));
        settle().await;

        // Both registrations describe the same folder, so the single
        // folder watcher suffices.
        assert_eq!(coordinator.state(), RecursiveWatcherState::SingleFolderActive);
    }

    #[tokio::test]
    async fn test_missing_folder_reports_error_as_value() {
        let coordinator = WatchCoordinator::new(false);
        let mut errors = coordinator.subscribe_errors();

        coordinator.register(WatchedFolder::new("/nonexistent/diskfs-test-path"));
        settle().await;

        assert_eq!(coordinator.state(), RecursiveWatcherState::Empty);
        let error = tokio::time::timeout(Duration::from_secs(1), errors.recv())
            .await
            .expect("error not delivered")
            .expect("error stream closed");
        assert!(!error.message.is_empty());
    }

    #[tokio::test]
    async fn test_dispose_stops_recursive_watching() {
        let dir = TempDir::new().unwrap();
        let coordinator = WatchCoordinator::new(false);

        coordinator.register(WatchedFolder::new(dir.path()));
        settle().await;
        assert_eq!(coordinator.state(), RecursiveWatcherState::SingleFolderActive);

        coordinator.dispose();
        assert_eq!(coordinator.state(), RecursiveWatcherState::Empty);

        // Registrations after dispose never revive the watcher.
        coordinator.register(WatchedFolder::new(dir.path()));
        settle().await;
        assert_eq!(coordinator.state(), RecursiveWatcherState::Empty);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dispose_racing_registration_leaves_no_watcher() {
        let dir = TempDir::new().unwrap();
        for _ in 0..25 {
            let coordinator = WatchCoordinator::new(false);
            coordinator.register(WatchedFolder::new(dir.path()));
            // No settling first: the recomputation can be anywhere
            // between scheduled and installing when dispose arrives.
            // Whichever order the two take the active lock in, no
            // watcher may survive the dispose.
            coordinator.dispose();
            settle().await;
            assert_eq!(coordinator.state(), RecursiveWatcherState::Empty);
        }
    }

    #[tokio::test]
    async fn test_non_recursive_watcher_is_independent() {
        let dir = TempDir::new().unwrap();
        let coordinator = WatchCoordinator::new(false);

        let watcher = coordinator
            .watch_non_recursive(dir.path().to_path_buf())
            .unwrap();
        assert_eq!(watcher.path(), dir.path());
        // Created immediately, without touching the recursive state.
        assert_eq!(coordinator.state(), RecursiveWatcherState::Empty);

        coordinator.dispose();
        // Still alive after provider dispose; the caller owns it.
        assert_eq!(watcher.path(), dir.path());
        watcher.dispose();
    }

    #[tokio::test]
    async fn test_recursive_events_reach_shared_stream() {
        let dir = TempDir::new().unwrap();
        let coordinator = WatchCoordinator::new(false);
        let mut changes = coordinator.subscribe_changes();

        coordinator.register(WatchedFolder::new(dir.path()));
        settle().await;

        tokio::fs::write(dir.path().join("observed.txt"), b"x")
            .await
            .unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(5), changes.recv())
            .await
            .expect("no change batch delivered")
            .expect("change stream closed");
        assert!(!batch.is_empty());
    }
}
