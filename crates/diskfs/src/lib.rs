//! Local-disk filesystem provider.
//!
//! A host application manipulates files through one capability-flagged
//! interface without knowing whether a resource is local, remote, or
//! virtual. Key components:
//!
//! - [`FileSystemProvider`] - Operations trait behind capability flags
//! - [`DiskFileSystemProvider`] - Local-disk implementation
//! - [`FsError`] - Closed error taxonomy; raw OS errors never escape
//! - [`WatchCoordinator`] - One shared recursive watcher, coalesced
//!   transitions, plus independent non-recursive watchers
//!
//! ## Design Decisions
//!
//! - **Normalize at the boundary**: every OS failure funnels through
//!   one mapping point into five taxonomy variants.
//! - **Validate before mutating**: write/rename/copy check target
//!   state before any byte is touched.
//! - **Ownership instead of descriptor tables**: `open` hands the
//!   caller a [`FileHandle`]; the provider keeps no handle table.
//! - **One recursive watcher**: however many folders are registered,
//!   at most one recursive watcher is alive, selected by population
//!   size and reconfigured in place when it supports it.

mod disk;
mod error;
mod provider;
mod types;
mod watch;

pub use disk::DiskFileSystemProvider;
pub use error::{FsError, FsResult};
pub use provider::FileSystemProvider;
pub use types::{
    Capabilities, ChangeKind, DeleteOptions, DirEntry, FileChange, FileHandle, FileType,
    OpenOptions, OverwriteOptions, Resource, Stat, WatchedFolder, WriteOptions,
};
pub use watch::{
    ChangeHandler, CoalescingTrigger, ErrorHandler, MultiFolderWatcher, NonRecursiveWatcher,
    RecursiveWatcherState, SingleFolderWatcher, WatchCoordinator, WatcherError,
};
