//! Demultiplexes records across per-statement queues.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::QueueError;
use crate::queue::{clamp_limit, Backend, RecordFactory};
use crate::record::Record;

/// Builds the backend for the first record seen under a new statement key.
///
/// Receives the triggering record (to read its statement key and SQL shape) and a [`RecordFactory`]
/// already derived from it, and returns whatever backend should hold that key's queue. Typical
/// implementations try a [`crate::queue::DurableQueue`] first and fall back to a
/// [`crate::queue::MemoryQueue`] if the durable file cannot be opened.
pub(crate) type BackendFactory =
    Arc<dyn Fn(&dyn Record, RecordFactory) -> Result<Arc<dyn Backend>, QueueError> + Send + Sync>;

/// Fans records out to one backend queue per distinct statement key.
///
/// A `Pool` is backend-agnostic: it only ever talks to [`Backend`], so durable and in-memory
/// queues are interchangeable from its point of view. The first record pushed under a given
/// statement key decides that key's backend for the pool's lifetime; later records under the same
/// key reuse it regardless of their own concrete type, as long as they share a statement key.
pub struct Pool {
    new_backend: BackendFactory,
    open: Mutex<HashMap<String, Arc<dyn Backend>>>,
}

impl Pool {
    pub(crate) fn new(new_backend: BackendFactory) -> Self {
        Self {
            new_backend,
            open: Mutex::new(HashMap::new()),
        }
    }

    fn backend_for(
        &self,
        open: &mut HashMap<String, Arc<dyn Backend>>,
        record: &dyn Record,
    ) -> Result<Arc<dyn Backend>, QueueError> {
        let key = record.statement_key();
        if let Some(backend) = open.get(key) {
            return Ok(Arc::clone(backend));
        }

        let template = record.empty_instance();
        let factory: RecordFactory = Arc::new(move || template.empty_instance());

        let backend = (self.new_backend)(record, factory)?;
        open.insert(key.to_string(), Arc::clone(&backend));
        Ok(backend)
    }

    /// Routes a single record to its statement key's queue.
    pub fn push(&self, record: &dyn Record) -> Result<(), QueueError> {
        let mut open = self.open.lock();
        let backend = self.backend_for(&mut open, record)?;
        backend.push(record)
    }

    /// Routes each record in `records` to its statement key's queue, in order.
    ///
    /// Not atomic across records: if a later record's queue fails, earlier records in the batch
    /// have already been durably (or volatilely) pushed.
    pub fn append(&self, records: &[Box<dyn Record>]) -> Result<(), QueueError> {
        let mut open = self.open.lock();
        for record in records {
            let backend = self.backend_for(&mut open, record.as_ref())?;
            backend.push(record.as_ref())?;
        }
        Ok(())
    }

    /// Drains up to `limit` records across all open queues (negative means "all").
    ///
    /// A failure ejecting from any single queue aborts the whole call: the error is returned and
    /// no records at all, including ones already pulled from other queues in this call, are handed
    /// back. Every backend's own consume cursor still only advances past records it actually
    /// returned before failing, so nothing already-flushed is lost — the caller simply retries.
    pub fn eject(&self, limit: i64) -> Result<Vec<Box<dyn Record>>, QueueError> {
        let open = self.open.lock();

        let total: usize = open.values().map(|b| b.len()).sum();
        let n = clamp_limit(limit, total);
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(n);
        for backend in open.values() {
            if out.len() >= n {
                break;
            }

            let remaining = (n - out.len()) as i64;
            let outcome = backend.eject(remaining);
            if let Some(err) = outcome.error {
                return Err(err);
            }
            out.extend(outcome.records);
        }

        Ok(out)
    }

    /// Total number of not-yet-ejected records across all open queues.
    pub fn len(&self) -> usize {
        self.open.lock().values().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
