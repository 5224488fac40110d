//! The closed set of record kinds this profiler understands, and parsing of
//! their kernel-defined payload layouts (`perf_event_open(2)`, `PERF_RECORD_*`).

use byteorder::{ByteOrder, NativeEndian};

use crate::sys::{PERF_RECORD_EXIT, PERF_RECORD_FORK, PERF_RECORD_SAMPLE};

/// A sample captured at counter overflow: instruction pointer, thread id,
/// and the kernel-recorded call chain (top frame only is symbolized; see
/// the Symbolizer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    pub ip: u64,
    pub tid: u32,
    pub call_chain: Vec<u64>,
}

/// Shared payload shape of `PERF_RECORD_FORK` and `PERF_RECORD_EXIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRecord {
    pub pid: u32,
    pub parent_pid: u32,
    pub tid: u32,
    pub parent_tid: u32,
    pub timestamp_ns: u64,
}

/// One record drained from a Counter's ring buffer, classified by kernel
/// record type. `Other` absorbs every `PERF_RECORD_*` this profiler doesn't
/// act on (mmap, comm, lost, throttle, ...); the kernel ABI is closed, so we
/// use a tagged enum rather than open polymorphism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Sample(SampleRecord),
    ThreadStart(TaskRecord),
    ThreadEnd(TaskRecord),
    Other,
}

/// Parses one record body given its kernel record-type tag and the raw bytes
/// following the `{type, misc, size}` header. Returns `None` if the body is
/// truncated relative to what the record kind requires; callers treat that
/// as `Record::Other` rather than panicking, since a malformed record must
/// never take down the sampling loop.
pub fn parse_record(kind: u32, body: &[u8]) -> Option<Record> {
    match kind {
        PERF_RECORD_SAMPLE => parse_sample(body).map(Record::Sample),
        PERF_RECORD_FORK => parse_task(body).map(Record::ThreadStart),
        PERF_RECORD_EXIT => parse_task(body).map(Record::ThreadEnd),
        _ => Some(Record::Other),
    }
}

/// Layout for `sample_type = PERF_SAMPLE_IP | PERF_SAMPLE_TID | PERF_SAMPLE_CALLCHAIN`:
/// `ip:u64, pid:u32, tid:u32, nr:u64, ips:[u64; nr]`.
fn parse_sample(body: &[u8]) -> Option<SampleRecord> {
    if body.len() < 16 {
        return None;
    }
    let ip = NativeEndian::read_u64(&body[0..8]);
    // pid occupies body[8..12]; this profiler only needs tid.
    let tid = NativeEndian::read_u32(&body[12..16]);

    let call_chain = if body.len() >= 24 {
        let nr = NativeEndian::read_u64(&body[16..24]) as usize;
        let mut chain = Vec::with_capacity(nr.min(4096));
        let mut offset = 24;
        for _ in 0..nr {
            if offset + 8 > body.len() {
                break;
            }
            chain.push(NativeEndian::read_u64(&body[offset..offset + 8]));
            offset += 8;
        }
        chain
    } else {
        Vec::new()
    };

    Some(SampleRecord { ip, tid, call_chain })
}

/// Layout: `pid:u32, ppid:u32, tid:u32, ptid:u32, time:u64`.
fn parse_task(body: &[u8]) -> Option<TaskRecord> {
    if body.len() < 20 {
        return None;
    }
    Some(TaskRecord {
        pid: NativeEndian::read_u32(&body[0..4]),
        parent_pid: NativeEndian::read_u32(&body[4..8]),
        tid: NativeEndian::read_u32(&body[8..12]),
        parent_tid: NativeEndian::read_u32(&body[12..16]),
        timestamp_ns: NativeEndian::read_u64(&body[16..24]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le_bytes(words: &[u64]) -> Vec<u8> {
        let mut out = Vec::new();
        for w in words {
            out.extend_from_slice(&w.to_ne_bytes());
        }
        out
    }

    #[test]
    fn parses_sample_without_call_chain() {
        // ip=0x1000, pid=1, tid=2 packed into one u64 slot (pid low, tid high on LE).
        let mut body = 0x1000u64.to_ne_bytes().to_vec();
        body.extend_from_slice(&1u32.to_ne_bytes());
        body.extend_from_slice(&2u32.to_ne_bytes());
        let record = parse_sample(&body).unwrap();
        assert_eq!(record.ip, 0x1000);
        assert_eq!(record.tid, 2);
        assert!(record.call_chain.is_empty());
    }

    #[test]
    fn parses_sample_with_call_chain() {
        let mut body = 0x2000u64.to_ne_bytes().to_vec();
        body.extend_from_slice(&7u32.to_ne_bytes());
        body.extend_from_slice(&8u32.to_ne_bytes());
        body.extend_from_slice(&le_bytes(&[2, 0xaaaa, 0xbbbb]));
        let record = parse_sample(&body).unwrap();
        assert_eq!(record.tid, 8);
        assert_eq!(record.call_chain, vec![0xaaaa, 0xbbbb]);
    }

    #[test]
    fn parses_fork_and_exit_task_records() {
        let body = le_bytes(&[
            (100u64) | (200u64 << 32),
            (101u64) | (201u64 << 32),
            5_000_000,
        ]);
        let task = parse_task(&body).unwrap();
        assert_eq!(task.pid, 100);
        assert_eq!(task.parent_pid, 200);
        assert_eq!(task.tid, 101);
        assert_eq!(task.parent_tid, 201);
        assert_eq!(task.timestamp_ns, 5_000_000);
    }

    #[test]
    fn classifies_by_kernel_record_type() {
        let body = le_bytes(&[1 | (2 << 32), 3 | (4 << 32), 0]);
        assert!(matches!(
            parse_record(PERF_RECORD_FORK, &body),
            Some(Record::ThreadStart(_))
        ));
        assert!(matches!(
            parse_record(PERF_RECORD_EXIT, &body),
            Some(Record::ThreadEnd(_))
        ));
        assert!(matches!(parse_record(999, &body), Some(Record::Other)));
    }

    #[test]
    fn truncated_body_yields_none() {
        assert_eq!(parse_sample(&[0u8; 4]), None);
        assert_eq!(parse_task(&[0u8; 4]), None);
    }
}
