//! C4: Event Loop. Single-threaded, cooperative readiness loop over every
//! live Counter descriptor, grounded in the teacher crate's
//! `samply/src/linux/perf_group.rs::poll_events` (which also prefers
//! `libc::poll` over `epoll` for a small, frequently-changing descriptor set).

use std::os::unix::io::RawFd;

use log::debug;

use crate::context::ProfilerContext;
use crate::record::Record;
use crate::tracker::EndOutcome;

/// Runs the sampling loop to completion: blocks on readiness, drains every
/// ready descriptor to quiescence, dispatches each record, and returns once
/// the root thread's exit record has been observed.
pub fn run(ctx: &mut ProfilerContext) -> std::io::Result<()> {
    loop {
        if ctx.tracker.is_empty() {
            return Ok(());
        }

        let fds: Vec<RawFd> = ctx.tracker.live_fds().collect();
        let mut poll_fds: Vec<libc::pollfd> =
            fds.iter().map(|&fd| libc::pollfd { fd, events: libc::POLLIN, revents: 0 }).collect();

        let ready = unsafe { libc::poll(poll_fds.as_mut_ptr(), poll_fds.len() as libc::nfds_t, -1) };
        if ready < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }

        let mut shutdown = false;
        for poll_fd in &poll_fds {
            if poll_fd.revents == 0 {
                continue;
            }
            if drain_one(ctx, poll_fd.fd) {
                shutdown = true;
            }
        }

        if shutdown {
            return Ok(());
        }
    }
}

/// Drains descriptor `fd` to quiescence, returning whether the root thread's
/// exit was observed during this drain.
fn drain_one(ctx: &mut ProfilerContext, fd: RawFd) -> bool {
    let mut shutdown = false;
    loop {
        let Some(counter) = ctx.tracker.counter_mut(fd) else { break };
        if !counter.has_record() {
            break;
        }
        let Some(record) = counter.next_record() else { break };

        match record {
            Record::Sample(sample) => {
                let function_name = ctx.symbolizer.resolve(sample.tid, sample.ip);
                ctx.aggregator.record_sample(sample.tid, &function_name);
            }
            Record::ThreadStart(task) => {
                ctx.tracker.on_thread_start(task.tid);
            }
            Record::ThreadEnd(task) => {
                if matches!(ctx.tracker.on_thread_end(fd, task.tid), EndOutcome::Shutdown) {
                    shutdown = true;
                }
            }
            Record::Other => {
                debug!("ignored non-sample record on fd {fd}");
            }
        }
    }
    shutdown
}
