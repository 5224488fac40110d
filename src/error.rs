//! Error model. Mirrors the fatal/benign split the teacher crate uses for
//! its macOS sampler (`SamplingError::{Fatal, Ignorable}`), adapted to the
//! two failure classes spec.md §7 names for the Linux sampling pipeline.

use std::io;
use std::os::unix::io::RawFd;

use thiserror::Error;

/// Benign, per-call outcome of [`crate::counter::Counter::open`]: the
/// target thread raced us and is already gone by the time we tried to open
/// its counter. Not an error to propagate — the caller logs and moves on.
#[derive(Debug, Error)]
pub enum CounterOpenError {
    #[error("thread no longer exists (perf_event_open returned ESRCH)")]
    Missed,
    #[error("perf_event_open failed: {0}")]
    Fatal(#[source] io::Error),
}

/// A kernel-ABI failure that spec.md §7 classifies as fatal: there is no
/// partial-report recovery path, so the profiler aborts with a diagnostic
/// naming the syscall and the descriptor it failed on.
#[derive(Debug, Error)]
pub enum ProfilerError {
    #[error("{syscall} failed on fd {fd}: {source}")]
    KernelAbi {
        syscall: &'static str,
        fd: RawFd,
        #[source]
        source: io::Error,
    },
    #[error("launch failed: {0}")]
    Launch(#[source] io::Error),
}

impl ProfilerError {
    pub fn kernel_abi(syscall: &'static str, fd: RawFd, source: io::Error) -> Self {
        ProfilerError::KernelAbi { syscall, fd, source }
    }
}
