//! A durable, buffered, batch-inserting client for columnar SQL databases.
//!
//! Records are pushed one at a time through a [`Sender`] and land in a per-statement-key,
//! file-backed queue ([`queue::DurableQueue`]) with an in-memory fallback
//! ([`queue::MemoryQueue`]) for when the disk queue cannot be opened. A background task drains
//! both queues on a timer, groups what it drained by statement key, and executes each group as a
//! single transaction against a caller-supplied [`Connection`]. A failed publish re-queues its
//! batch rather than dropping it, falling all the way through to a [`DeadLetterDumper`] only if
//! neither queue can take it back.
//!
//! Crash consistency is scoped to the on-disk queue files: a killed process leaves each queue file
//! with a correct header for everything durably appended before the kill, nothing more. Power-loss
//! correctness (surviving an OS crash or unflushed disk cache) is out of scope.

pub mod error;
mod pool;
pub mod queue;
pub mod record;
pub mod sender;

pub use error::QueueError;
pub use queue::{DurableQueue, FileLoader, MemoryQueue};
pub use record::{ExecValue, Record, RecordDecodeError};
pub use sender::{
    BoxDynError, Connection, DeadLetterDumper, FileDumper, NullDumper, PreparedStatement,
    PublishError, PushError, Sender, SenderConfig, SenderConfigBuilder, Transaction,
};
