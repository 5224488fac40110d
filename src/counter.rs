//! C1: Counter. Owns one open `perf_event_open` descriptor and its mapped
//! ring buffer for a single thread, and yields typed [`Record`]s in FIFO
//! order.
//!
//! The mmap/ioctl/ring-buffer-framing approach is grounded in the teacher
//! crate's `samply/src/linux/perf_event.rs`; the attribute set and the
//! `ESRCH`-is-benign convention come from `examples/original_source/src/perf_lib.cc`.

use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::ptr;
use std::slice;
use std::sync::atomic::{fence, Ordering};

use libc::{c_void, pid_t};

use crate::error::CounterOpenError;
use crate::record::{parse_record, Record};
use crate::sys::*;

/// Number of data pages behind the control page, per spec.md §4.1
/// (`D = 256 · page_size`). Must be a power of two so the kernel's byte
/// offsets can be reduced mod `D`.
const NUM_DATA_PAGES: u64 = 256;

const HEADER_SIZE: usize = mem::size_of::<PerfEventHeader>();

pub struct Counter {
    fd: RawFd,
    /// Base of the whole mmap (control page followed by `NUM_DATA_PAGES`
    /// data pages).
    base: *mut u8,
    /// Size in bytes of the data region alone (`D`), excluding the control
    /// page.
    data_size: u64,
    tid: u32,
}

// The mmap'd region is exclusively owned by this Counter and never aliased
// outside of it; only raw pointers, not references, cross await/thread
// boundaries (there are none in this single-threaded design), so Counter can
// safely be moved between owners.
unsafe impl Send for Counter {}

impl Drop for Counter {
    fn drop(&mut self) {
        unsafe {
            let full_len = (self.data_size + page_size()) as usize;
            libc::munmap(self.base as *mut c_void, full_len);
            libc::close(self.fd);
        }
    }
}

fn page_size() -> u64 {
    page_size::get() as u64
}

impl Counter {
    /// Opens a counter for thread `tid`, per the kernel attributes in
    /// spec.md §4.1: hardware reference-cycle counting, the configured
    /// sample period, `{ip, tid, callchain}` sample payload, samples
    /// disabled at creation, no inheritance, task records enabled, kernel
    /// and hypervisor samples and call-chain frames excluded, watermark
    /// wakeups at 1.
    pub fn open(tid: u32, sample_period: u64) -> Result<Counter, CounterOpenError> {
        let mut attr: PerfEventAttr = unsafe { mem::zeroed() };
        attr.size = mem::size_of::<PerfEventAttr>() as u32;
        attr.kind = PERF_TYPE_HARDWARE;
        attr.config = PERF_COUNT_HW_REF_CPU_CYCLES;
        attr.sample_period = sample_period;
        attr.sample_type = PERF_SAMPLE_IP | PERF_SAMPLE_TID | PERF_SAMPLE_CALLCHAIN;
        attr.wakeup_events = 1;
        attr.flags = PERF_ATTR_FLAG_DISABLED
            | PERF_ATTR_FLAG_TASK
            | PERF_ATTR_FLAG_EXCLUDE_KERNEL
            | PERF_ATTR_FLAG_EXCLUDE_HV
            | PERF_ATTR_FLAG_EXCLUDE_CALLCHAIN_KERNEL
            | PERF_ATTR_FLAG_WATERMARK;

        let fd = sys_perf_event_open(&attr, tid as pid_t, -1, -1, PERF_FLAG_FD_CLOEXEC);
        if fd < 0 {
            let err = io::Error::from_raw_os_error(-fd);
            return Err(if err.raw_os_error() == Some(libc::ESRCH) {
                CounterOpenError::Missed
            } else {
                CounterOpenError::Fatal(err)
            });
        }

        let data_size = NUM_DATA_PAGES * page_size();
        let full_len = (data_size + page_size()) as usize;
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                full_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(CounterOpenError::Fatal(err));
        }

        Ok(Counter {
            fd,
            base: base as *mut u8,
            data_size,
            tid,
        })
    }

    pub fn tid(&self) -> u32 {
        self.tid
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn start(&mut self) -> io::Result<()> {
        ioctl(self.fd, PERF_EVENT_IOC_ENABLE)
    }

    pub fn stop(&mut self) -> io::Result<()> {
        ioctl(self.fd, PERF_EVENT_IOC_DISABLE)
    }

    pub fn reset(&mut self) -> io::Result<()> {
        ioctl(self.fd, PERF_EVENT_IOC_RESET)
    }

    fn control_page(&self) -> &PerfEventMmapPage {
        unsafe { &*(self.base as *const PerfEventMmapPage) }
    }

    fn data(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.base.add(page_size() as usize), self.data_size as usize) }
    }

    fn read_head(&self) -> u64 {
        let page = self.control_page();
        let head = unsafe { ptr::read_volatile(&page.data_head) };
        fence(Ordering::Acquire);
        head
    }

    fn read_tail(&self) -> u64 {
        unsafe { ptr::read_volatile(&self.control_page().data_tail) }
    }

    /// Advances the consumer cursor, releasing the consumed bytes back to
    /// the kernel. Release-ordered so the kernel only reuses the space
    /// after we are done reading it.
    fn write_tail(&mut self, value: u64) {
        fence(Ordering::AcqRel);
        let page = unsafe { &mut *(self.base as *mut PerfEventMmapPage) };
        unsafe { ptr::write_volatile(&mut page.data_tail, value) };
    }

    pub fn has_record(&self) -> bool {
        self.read_head() != self.read_tail()
    }

    /// Returns the next record and advances the consumer cursor by its
    /// declared length. Records are expected not to straddle the `D`
    /// wraparound boundary per the kernel's alignment guarantee, but if one
    /// ever does, this copies header and body out into a scratch buffer
    /// rather than relying on that guarantee holding for every kernel
    /// version — the two-piece read is the one place this differs from a
    /// strict single-contiguous-slice reader.
    pub fn next_record(&mut self) -> Option<Record> {
        let head = self.read_head();
        let tail = self.read_tail();
        if head == tail {
            return None;
        }

        let size = self.data_size;
        let start = (tail % size) as usize;

        let header_bytes = {
            let data = self.data();
            read_wrapping(data, start, HEADER_SIZE)
        };
        let header: PerfEventHeader =
            unsafe { ptr::read_unaligned(header_bytes.as_ptr() as *const PerfEventHeader) };
        let total_len = header.size as usize;
        let body_len = total_len.saturating_sub(HEADER_SIZE);
        let body_start = (start + HEADER_SIZE) % size as usize;
        let body = {
            let data = self.data();
            read_wrapping(data, body_start, body_len)
        };

        let record = parse_record(header.kind as u32, &body).unwrap_or(Record::Other);

        self.write_tail(tail + total_len as u64);
        Some(record)
    }
}

/// Reads `len` bytes starting at `start` within a ring of `data.len()`
/// bytes, copying out and stitching the two pieces back together if the
/// range crosses the end of the buffer.
fn read_wrapping(data: &[u8], start: usize, len: usize) -> Vec<u8> {
    let size = data.len();
    if start + len <= size {
        data[start..start + len].to_vec()
    } else {
        let first_len = size - start;
        let mut out = Vec::with_capacity(len);
        out.extend_from_slice(&data[start..size]);
        out.extend_from_slice(&data[0..len - first_len]);
        out
    }
}

fn ioctl(fd: RawFd, request: libc::c_ulong) -> io::Result<()> {
    let result = unsafe { libc::ioctl(fd, request as _) };
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_wrapping_contiguous_range() {
        let data: Vec<u8> = (0..16).collect();
        assert_eq!(read_wrapping(&data, 2, 4), vec![2, 3, 4, 5]);
    }

    #[test]
    fn read_wrapping_straddles_boundary() {
        let data: Vec<u8> = (0..16).collect();
        // start=14, len=4 -> wraps around to [14, 15, 0, 1]
        assert_eq!(read_wrapping(&data, 14, 4), vec![14, 15, 0, 1]);
    }

    #[test]
    fn read_wrapping_zero_length() {
        let data: Vec<u8> = (0..16).collect();
        assert_eq!(read_wrapping(&data, 5, 0), Vec::<u8>::new());
    }

    #[test]
    fn header_round_trips_through_bytes() {
        let header = PerfEventHeader { kind: PERF_RECORD_FORK, misc: 0, size: 40 };
        let bytes = unsafe {
            slice::from_raw_parts(
                &header as *const PerfEventHeader as *const u8,
                HEADER_SIZE,
            )
        };
        let roundtripped: PerfEventHeader =
            unsafe { ptr::read_unaligned(bytes.as_ptr() as *const PerfEventHeader) };
        assert_eq!(roundtripped.kind, PERF_RECORD_FORK);
        assert_eq!(roundtripped.size, 40);
    }
}
