//! The two queue backends (durable file-backed, volatile in-memory) and the loader that resolves
//! a record's statement key to its durable queue file.

mod file;
mod loader;
mod memory;

pub use file::DurableQueue;
pub use loader::FileLoader;
pub use memory::MemoryQueue;

use crate::error::QueueError;
use crate::record::Record;

/// Smallest and largest record payload size the wire format can represent.
pub const MIN_RECORD_SIZE: usize = 1;
pub const MAX_RECORD_SIZE: usize = u16::MAX as usize;

/// Byte offset of the data region within a durable queue file; see the crate-level format docs.
pub(crate) const DATA_OFFSET: u64 = 12;

/// A fresh, unmarshal-ready instance of a record's concrete type, produced on demand.
///
/// Captured once by the [`crate::pool::Pool`] from the first record pushed under a given
/// statement key, then handed to whichever backend owns that key's queue.
pub type RecordFactory = std::sync::Arc<dyn Fn() -> Box<dyn Record> + Send + Sync>;

/// The result of draining up to `limit` records from a single queue.
///
/// Mid-drain errors are non-fatal to records already reconstructed: `records` holds everything
/// successfully reconstructed before `error` was hit, and any consumed bytes behind those
/// records have already been committed past the consume cursor. Records at or after the point of
/// failure remain on the queue to be retried on the next drain.
pub struct EjectOutcome {
    pub records: Vec<Box<dyn Record>>,
    pub error: Option<QueueError>,
}

impl EjectOutcome {
    fn ok(records: Vec<Box<dyn Record>>) -> Self {
        Self {
            records,
            error: None,
        }
    }
}

/// Common contract shared by the durable and in-memory queue backends.
///
/// [`crate::pool::Pool`] is written once against this trait and works unmodified with either
/// backend; the durable implementation additionally persists to disk and can fail with
/// [`QueueError::Io`]/[`QueueError::InvalidFile`], while the memory implementation's `push` never
/// fails.
pub(crate) trait Backend: Send + Sync {
    /// Serializes and appends `record`.
    fn push(&self, record: &dyn Record) -> Result<(), QueueError>;

    /// Drains up to `limit` records (negative means "all", zero means "none").
    fn eject(&self, limit: i64) -> EjectOutcome;

    /// Current number of not-yet-ejected records.
    fn len(&self) -> usize;
}

/// Clamps an `Eject` limit request against the current live count, per the shared contract: a
/// negative limit means "drain everything", and a limit larger than the live count is capped at
/// the live count.
pub(crate) fn clamp_limit(limit: i64, count: usize) -> usize {
    if limit < 0 {
        count
    } else {
        (limit as usize).min(count)
    }
}
