//! Raw `perf_event_open` ABI: syscall wrapper, `perf_event_attr` layout, the
//! mmap'd ring buffer control page, and the record-kind/sample-type bit
//! constants this crate actually uses.
//!
//! Field layout and flag bit positions are taken from the Linux
//! `perf_event.h` UAPI header, the same source the teacher crate's
//! `samply/src/linux/sys.rs` draws from.

#![allow(dead_code)]

use std::fmt;

use libc::{c_int, c_ulong, pid_t, syscall, SYS_perf_event_open};

pub const PERF_FLAG_FD_CLOEXEC: c_ulong = 1 << 3;

pub const PERF_TYPE_HARDWARE: u32 = 0;

/// "Reference" CPU cycles: counts cycles independent of frequency scaling,
/// unlike the raw `PERF_COUNT_HW_CPU_CYCLES` counter.
pub const PERF_COUNT_HW_REF_CPU_CYCLES: u64 = 9;

pub const PERF_ATTR_FLAG_DISABLED: u64 = 1 << 0;
pub const PERF_ATTR_FLAG_EXCLUDE_KERNEL: u64 = 1 << 5;
pub const PERF_ATTR_FLAG_EXCLUDE_HV: u64 = 1 << 6;
pub const PERF_ATTR_FLAG_TASK: u64 = 1 << 13;
pub const PERF_ATTR_FLAG_WATERMARK: u64 = 1 << 14;
pub const PERF_ATTR_FLAG_EXCLUDE_CALLCHAIN_KERNEL: u64 = 1 << 21;

pub const PERF_SAMPLE_IP: u64 = 1 << 0;
pub const PERF_SAMPLE_TID: u64 = 1 << 1;
pub const PERF_SAMPLE_CALLCHAIN: u64 = 1 << 5;

pub const PERF_RECORD_MMAP: u32 = 1;
pub const PERF_RECORD_LOST: u32 = 2;
pub const PERF_RECORD_COMM: u32 = 3;
pub const PERF_RECORD_EXIT: u32 = 4;
pub const PERF_RECORD_THROTTLE: u32 = 5;
pub const PERF_RECORD_UNTHROTTLE: u32 = 6;
pub const PERF_RECORD_FORK: u32 = 7;
pub const PERF_RECORD_SAMPLE: u32 = 9;

mod ioctl {
    use libc::c_ulong;

    pub const IOC_NRSHIFT: c_ulong = 0;
    pub const IOC_NRBITS: c_ulong = 8;
    pub const IOC_TYPEBITS: c_ulong = 8;
    pub const IOC_TYPESHIFT: c_ulong = IOC_NRSHIFT + IOC_NRBITS;
    pub const IOC_SIZEBITS: c_ulong = 14;
    pub const IOC_SIZESHIFT: c_ulong = IOC_TYPESHIFT + IOC_TYPEBITS;
    pub const IOC_NONE: c_ulong = 0;
}

macro_rules! io {
    ($kind:expr, $nr:expr) => {
        (ioctl::IOC_NONE << (ioctl::IOC_SIZESHIFT + ioctl::IOC_SIZEBITS))
            | (($kind as c_ulong) << ioctl::IOC_TYPESHIFT)
            | ($nr << ioctl::IOC_NRSHIFT)
    };
}

pub const PERF_EVENT_IOC_ENABLE: c_ulong = io!(b'$', 0);
pub const PERF_EVENT_IOC_DISABLE: c_ulong = io!(b'$', 1);
pub const PERF_EVENT_IOC_RESET: c_ulong = io!(b'$', 2);

#[repr(C)]
pub struct PerfEventAttr {
    pub kind: u32,
    pub size: u32,
    pub config: u64,
    pub sample_period: u64,
    pub sample_type: u64,
    pub read_format: u64,
    pub flags: u64,
    pub wakeup_events: u32,
    pub bp_type: u32,
    pub bp_addr_or_config: u64,
    pub bp_len_or_config: u64,
    pub branch_sample_type: u64,
    pub sample_regs_user: u64,
    pub sample_stack_user: u32,
    pub clock_id: i32,
}

/// The kernel-mapped control page. Only the fields this crate reads or
/// writes are given real names; the rest are folded into `reserved` to keep
/// the layout (and therefore `size`) correct across kernel versions.
#[repr(C)]
pub struct PerfEventMmapPage {
    pub version: u32,
    pub compat_version: u32,
    pub lock: u32,
    pub index: u32,
    pub offset: i64,
    pub time_enabled: u64,
    pub time_running: u64,
    pub capabilities: u64,
    pub pmc_width: u16,
    pub time_shift: u16,
    pub time_mult: u32,
    pub time_offset: u64,
    pub time_zero: u64,
    pub size: u32,
    pub reserved: [u8; 118 * 8 + 4],
    pub data_head: u64,
    pub data_tail: u64,
    pub data_offset: u64,
    pub data_size: u64,
    pub aux_head: u64,
    pub aux_tail: u64,
    pub aux_offset: u64,
    pub aux_size: u64,
}

#[derive(Debug)]
#[repr(C)]
pub struct PerfEventHeader {
    pub kind: u32,
    pub misc: u16,
    pub size: u16,
}

impl fmt::Debug for PerfEventMmapPage {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        fmt.debug_struct("PerfEventMmapPage")
            .field("data_head", &self.data_head)
            .field("data_tail", &self.data_tail)
            .field("data_size", &self.data_size)
            .finish()
    }
}

pub fn sys_perf_event_open(
    attr: &PerfEventAttr,
    pid: pid_t,
    cpu: c_int,
    group_fd: c_int,
    flags: c_ulong,
) -> c_int {
    unsafe { syscall(SYS_perf_event_open, attr as *const _, pid, cpu, group_fd, flags) as c_int }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn mmap_page_layout_matches_kernel_abi() {
        assert_eq!(mem::size_of::<PerfEventMmapPage>(), 1088);
    }

    #[test]
    fn ioctl_enable_matches_known_x86_64_value() {
        assert_eq!(PERF_EVENT_IOC_ENABLE, 9216);
    }
}
