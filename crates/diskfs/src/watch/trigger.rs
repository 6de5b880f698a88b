//! Coalescing scheduler for watcher recomputation.

use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct TriggerState {
    /// A run is queued but has not started yet.
    queued: bool,
    /// A run is executing right now.
    running: bool,
    /// Run once more after the executing run finishes.
    rerun: bool,
}

/// Merges rapid repeated schedule requests into one deferred run.
///
/// A request while a run is queued is superseded by it; a request while
/// a run is executing marks "run again after this one". There is never
/// more than one queued run, and runs never overlap. The minimum delay
/// is zero: a queued run starts on the next tick of the runtime.
#[derive(Clone, Default)]
pub struct CoalescingTrigger {
    state: Arc<Mutex<TriggerState>>,
}

impl CoalescingTrigger {
    /// Create an idle trigger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `job` to run on the next tick.
    ///
    /// `job` must be an idempotent recomputation reading current state;
    /// when a run is already queued the new request is dropped in its
    /// favor, and when one is executing the job runs exactly once more
    /// afterwards.
    pub fn schedule<F>(&self, job: F)
    where
        F: Fn() + Send + 'static,
    {
        {
            let mut state = self.state.lock();
            if state.running {
                state.rerun = true;
                return;
            }
            if state.queued {
                return;
            }
            state.queued = true;
        }

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            loop {
                tokio::task::yield_now().await;
                {
                    let mut s = state.lock();
                    s.queued = false;
                    s.running = true;
                }
                job();
                let mut s = state.lock();
                s.running = false;
                if s.rerun {
                    s.rerun = false;
                    s.queued = true;
                } else {
                    break;
                }
            }
        });
    }
}
