//! Change watching.
//!
//! - [`WatchCoordinator`] - owns the single shared recursive watcher
//! - [`CoalescingTrigger`] - merges registration bursts into one run
//! - watcher variants behind one construction contract

mod coordinator;
mod trigger;
mod watcher;

pub use coordinator::{RecursiveWatcherState, WatchCoordinator};
pub use trigger::CoalescingTrigger;
pub use watcher::{
    ChangeHandler, ErrorHandler, MultiFolderWatcher, NonRecursiveWatcher, SingleFolderWatcher,
    WatcherError,
};
