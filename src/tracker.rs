//! C3: Thread Tracker. Owns every live [`Counter`] for the process tree
//! being profiled, keyed by descriptor — the kernel delivers a thread's own
//! exit record on that thread's own counter, so a descriptor-keyed map with
//! tid carried in the record body is sufficient (spec.md §4.3).

use std::collections::HashMap;
use std::os::unix::io::RawFd;

use log::{info, warn};

use crate::counter::Counter;
use crate::error::CounterOpenError;

/// Outcome of delivering a `ThreadEnd` record to the tracker.
pub enum EndOutcome {
    /// An ordinary thread exited; sampling continues.
    Continue,
    /// The root thread exited; the event loop should shut down once it
    /// finishes draining the current wakeup.
    Shutdown,
}

/// Sample period, in reference cycles, every opened Counter uses. Fixed for
/// the lifetime of one profiler run.
pub struct ThreadTracker {
    sample_period: u64,
    root_tid: u32,
    counters: HashMap<RawFd, Counter>,
}

impl ThreadTracker {
    pub fn new(sample_period: u64) -> Self {
        ThreadTracker { sample_period, root_tid: 0, counters: HashMap::new() }
    }

    /// Opens and enables the root counter for the process the profiler just
    /// launched. Must be called exactly once, before the child is released.
    pub fn seed(&mut self, root_pid: u32) -> Result<RawFd, CounterOpenError> {
        self.root_tid = root_pid;
        let mut counter = Counter::open(root_pid, self.sample_period)?;
        counter.start().map_err(CounterOpenError::Fatal)?;
        let fd = counter.fd();
        self.counters.insert(fd, counter);
        Ok(fd)
    }

    /// Opens a counter for a newly observed thread. A `Missed` race (the
    /// thread already exited) is logged and dropped rather than propagated.
    pub fn on_thread_start(&mut self, tid: u32) -> Option<RawFd> {
        match Counter::open(tid, self.sample_period) {
            Ok(mut counter) => {
                if let Err(err) = counter.start() {
                    warn!("failed to enable counter for tid {tid}: {err}");
                    return None;
                }
                let fd = counter.fd();
                self.counters.insert(fd, counter);
                info!("tracking new thread {tid} on fd {fd}");
                Some(fd)
            }
            Err(CounterOpenError::Missed) => {
                info!("thread {tid} exited before its counter could be opened");
                None
            }
            Err(CounterOpenError::Fatal(err)) => {
                warn!("failed to open counter for tid {tid}: {err}");
                None
            }
        }
    }

    /// Retires the counter that delivered a `ThreadEnd` on descriptor `fd`,
    /// for the given `tid`. Returns whether the event loop should shut down.
    pub fn on_thread_end(&mut self, fd: RawFd, tid: u32) -> EndOutcome {
        self.counters.remove(&fd);
        if tid == self.root_tid {
            EndOutcome::Shutdown
        } else {
            EndOutcome::Continue
        }
    }

    pub fn counter_mut(&mut self, fd: RawFd) -> Option<&mut Counter> {
        self.counters.get_mut(&fd)
    }

    pub fn live_fds(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.counters.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_outcome_shuts_down_only_for_root_tid() {
        let mut tracker = ThreadTracker::new(1_000_000);
        tracker.root_tid = 42;
        // No counter registered at fd 7, but remove() on an absent key is a
        // harmless no-op, so this still exercises the shutdown decision.
        assert!(matches!(tracker.on_thread_end(7, 42), EndOutcome::Shutdown));
        assert!(matches!(tracker.on_thread_end(7, 99), EndOutcome::Continue));
    }

    #[test]
    fn new_tracker_has_no_live_counters() {
        let tracker = ThreadTracker::new(1_000_000);
        assert!(tracker.is_empty());
        assert_eq!(tracker.live_fds().count(), 0);
    }
}
