use std::sync::Arc;

use bytes::Bytes;
use sink_buffers::queue::{DurableQueue, MemoryQueue, RecordFactory};
use sink_buffers::{ExecValue, Record, RecordDecodeError};

/// A fixed-width record used across the benchmarks: an `id` field plus `N` words of padding, so
/// the cost of pushing/ejecting can be measured as a function of payload size.
#[derive(Clone, Copy, Debug)]
pub struct SizedRecord<const N: usize> {
    id: u64,
    padding: [u64; N],
}

impl<const N: usize> Default for SizedRecord<N> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<const N: usize> SizedRecord<N> {
    pub fn new(id: u64) -> Self {
        Self { id, padding: [0; N] }
    }
}

impl<const N: usize> Record for SizedRecord<N> {
    fn statement_key(&self) -> &str {
        "insert into bench_sized (id) values (?)"
    }

    fn exec_params(&self) -> Vec<ExecValue> {
        vec![ExecValue::I64(self.id as i64)]
    }

    fn marshal(&self) -> Bytes {
        let mut buf = Vec::with_capacity(8 + 8 * N);
        buf.extend_from_slice(&self.id.to_be_bytes());
        for word in &self.padding {
            buf.extend_from_slice(&word.to_be_bytes());
        }
        Bytes::from(buf)
    }

    fn unmarshal(&mut self, payload: &[u8]) -> Result<(), RecordDecodeError> {
        if payload.len() != 8 + 8 * N {
            return Err(RecordDecodeError::msg("unexpected sized-record payload length"));
        }
        self.id = u64::from_be_bytes(payload[0..8].try_into().unwrap());
        for (i, word) in self.padding.iter_mut().enumerate() {
            let start = 8 + i * 8;
            *word = u64::from_be_bytes(payload[start..start + 8].try_into().unwrap());
        }
        Ok(())
    }

    fn empty_instance(&self) -> Box<dyn Record> {
        Box::new(Self::default())
    }
}

pub fn factory<const N: usize>() -> RecordFactory {
    Arc::new(|| Box::new(SizedRecord::<N>::default()) as Box<dyn Record>)
}

/// Pushes `count` records then ejects everything, for the durable (file-backed) queue.
pub fn write_then_read_durable<const N: usize>(path: &std::path::Path, count: u64) {
    let queue = DurableQueue::open(path, factory::<N>()).expect("open durable queue");
    for i in 0..count {
        queue.push(&SizedRecord::<N>::new(i)).expect("push");
    }
    let outcome = queue.eject(-1);
    assert!(outcome.error.is_none());
    assert_eq!(outcome.records.len(), count as usize);
}

/// Pushes `count` records then ejects everything, for the in-memory queue.
pub fn write_then_read_memory<const N: usize>(count: u64) {
    let queue = MemoryQueue::new(factory::<N>());
    for i in 0..count {
        queue.push(&SizedRecord::<N>::new(i)).expect("push");
    }
    let outcome = queue.eject(-1);
    assert!(outcome.error.is_none());
    assert_eq!(outcome.records.len(), count as usize);
}
