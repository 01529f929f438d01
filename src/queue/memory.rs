use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::error::QueueError;
use crate::record::Record;

use super::{clamp_limit, Backend, EjectOutcome, RecordFactory};

/// The in-process fallback used when a statement's durable queue file cannot be loaded.
///
/// Holds marshalled bytes rather than live `Box<dyn Record>` values, so that [`crate::pool::Pool`]
/// can treat this and [`super::DurableQueue`] through the exact same [`Backend`] contract. The
/// cost is a redundant encode/decode round trip on every record; the benefit is that `Pool` never
/// needs to know which backend it is talking to. Contents do not survive a process restart.
pub struct MemoryQueue {
    records: Mutex<VecDeque<bytes::Bytes>>,
    factory: RecordFactory,
}

impl MemoryQueue {
    pub fn new(factory: RecordFactory) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            factory,
        }
    }
}

impl MemoryQueue {
    /// Serializes and appends `record`. See [`Backend::push`].
    pub fn push(&self, record: &dyn Record) -> Result<(), QueueError> {
        Backend::push(self, record)
    }

    /// Drains up to `limit` records (negative means "all", zero means "none"). See
    /// [`Backend::eject`].
    pub fn eject(&self, limit: i64) -> EjectOutcome {
        Backend::eject(self, limit)
    }

    /// Current number of not-yet-ejected records. See [`Backend::len`].
    pub fn len(&self) -> usize {
        Backend::len(self)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Backend for MemoryQueue {
    fn push(&self, record: &dyn Record) -> Result<(), QueueError> {
        self.records.lock().push_back(record.marshal());
        Ok(())
    }

    fn eject(&self, limit: i64) -> EjectOutcome {
        let mut queue = self.records.lock();
        let n = clamp_limit(limit, queue.len());
        if n == 0 {
            return EjectOutcome::ok(Vec::new());
        }

        let mut records = Vec::with_capacity(n);
        let mut error = None;

        for _ in 0..n {
            let payload = queue.pop_front().expect("count already clamped to len");
            let mut fresh = (self.factory)();
            match fresh.unmarshal(&payload) {
                Ok(()) => records.push(fresh),
                Err(e) => {
                    error = Some(QueueError::Decode { source: e });
                    break;
                }
            }
        }

        EjectOutcome { records, error }
    }

    fn len(&self) -> usize {
        self.records.lock().len()
    }
}
