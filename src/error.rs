//! Error taxonomy for the durable/memory queue layer.
//!
//! `PushError` and `PublishError`, which round out the error kinds surfaced further up the
//! stack (shutdown, driver, rollback), live next to [`crate::sender::Sender`] and
//! [`crate::sender::connection`] respectively.

use std::io;

use snafu::Snafu;

use crate::record::RecordDecodeError;

/// Errors produced by the durable file queue and the in-memory fallback queue.
#[derive(Debug, Snafu)]
pub enum QueueError {
    /// Underlying file I/O failed. Recoverable by the caller falling back to another tier.
    #[snafu(display("queue I/O error: {source}"))]
    Io { source: io::Error },

    /// The queue file's header CRC did not match the recomputed CRC of its data region, or it
    /// contained a record declaring an impossible size, or a record was truncated at EOF.
    ///
    /// Recovered by [`crate::queue::FileLoader`] rotating the file aside.
    #[snafu(display("durable queue file is invalid: {reason}"))]
    InvalidFile { reason: String },

    /// A single record's marshalled length was zero or exceeded 65535 bytes. Surfaced to the
    /// caller; never retried.
    #[snafu(display("record size {size} is out of the allowed 1..=65535 range"))]
    Oversize { size: usize },

    /// A record could not be reconstructed from its on-disk bytes during `Eject`.
    #[snafu(display("failed to decode record during eject: {source}"))]
    Decode { source: RecordDecodeError },
}

impl QueueError {
    pub(crate) fn io(source: io::Error) -> Self {
        Self::Io { source }
    }

    pub(crate) fn invalid_file(reason: impl Into<String>) -> Self {
        Self::InvalidFile {
            reason: reason.into(),
        }
    }
}

impl From<io::Error> for QueueError {
    fn from(source: io::Error) -> Self {
        Self::Io { source }
    }
}
