//! C6: Launch. Spawns the profiled command suspended on a pipe read, so the
//! parent can attach the root Counter before the child executes any
//! instructions, per spec.md §6's child launch contract.
//!
//! Grounded in the teacher crate's `samply/src/linux/process.rs`
//! (`SuspendedLaunchedProcess`), simplified from its two-pipe exec-error-
//! reporting scheme to the single release-pipe the spec calls for; exec
//! failures are instead surfaced through the child's own exit status.

use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;

use crate::error::ProfilerError;

/// A forked child blocked on a pipe read, not yet executing `argv[0]`.
pub struct SuspendedChild {
    pub pid: u32,
    release_fd: RawFd,
}

impl SuspendedChild {
    /// Forks and execs `argv`, with the child blocking on a one-byte pipe
    /// read before `execvp`. Returns once the fork has happened; the child
    /// does not run user code until [`SuspendedChild::release`] is called.
    pub fn spawn(argv: &[String]) -> Result<SuspendedChild, ProfilerError> {
        if argv.is_empty() {
            return Err(ProfilerError::Launch(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no command given",
            )));
        }

        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(ProfilerError::Launch(io::Error::last_os_error()));
        }
        let [read_fd, write_fd] = fds;

        let c_argv: Vec<CString> = argv
            .iter()
            .map(|s| CString::new(s.as_str()).expect("argv must not contain NUL bytes"))
            .collect();

        let pid = unsafe { libc::fork() };
        if pid < 0 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(read_fd);
                libc::close(write_fd);
            }
            return Err(ProfilerError::Launch(err));
        }

        if pid == 0 {
            unsafe {
                libc::close(write_fd);
                let mut byte: u8 = 0;
                libc::read(read_fd, &mut byte as *mut u8 as *mut libc::c_void, 1);
                libc::close(read_fd);

                let mut argv_ptrs: Vec<*const libc::c_char> =
                    c_argv.iter().map(|s| s.as_ptr()).collect();
                argv_ptrs.push(std::ptr::null());
                libc::execvp(c_argv[0].as_ptr(), argv_ptrs.as_ptr());
                // execvp only returns on failure.
                libc::_exit(127);
            }
        }

        unsafe { libc::close(read_fd) };
        Ok(SuspendedChild { pid: pid as u32, release_fd: write_fd })
    }

    /// Releases the child to begin executing `argv[0]`. The caller must
    /// already have the root Counter open and enabled before calling this.
    pub fn release(self) -> io::Result<()> {
        let byte: u8 = 1;
        let result = unsafe {
            libc::write(self.release_fd, &byte as *const u8 as *const libc::c_void, 1)
        };
        unsafe { libc::close(self.release_fd) };
        if result < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

/// Blocks until `pid` exits, returning its exit code (or 128+signal if it
/// was killed by a signal, matching shell conventions).
pub fn wait_for_exit(pid: u32) -> io::Result<i32> {
    let mut status: libc::c_int = 0;
    let result = unsafe { libc::waitpid(pid as libc::pid_t, &mut status, 0) };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    if libc::WIFEXITED(status) {
        Ok(libc::WEXITSTATUS(status))
    } else if libc::WIFSIGNALED(status) {
        Ok(128 + libc::WTERMSIG(status))
    } else {
        Ok(1)
    }
}
