//! The minimal async database surface a [`crate::Sender`] needs: begin a transaction, prepare a
//! statement inside it, execute it once per record, commit or roll back.
//!
//! Kept driver-agnostic and object-safe on purpose, the same way the core queue layer is kept
//! agnostic of any one record type: an adapter over `sqlx`, `tiberius`, a ClickHouse client, or
//! anything else that can begin a transaction and prepare a statement implements these three
//! traits and nothing else.

use async_trait::async_trait;
use snafu::Snafu;

use crate::record::ExecValue;

/// A type-erased driver error, boxed so this module never names a concrete driver's error type.
pub type BoxDynError = Box<dyn std::error::Error + Send + Sync>;

/// A pooled or single database connection capable of starting transactions.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, BoxDynError>;
}

/// An open transaction. Every method consumes `self` behind a `Box` so the trait stays
/// object-safe while still expressing that commit and rollback are one-shot, terminal actions.
#[async_trait]
pub trait Transaction: Send + Sync {
    async fn prepare<'a>(
        &'a mut self,
        statement: &str,
    ) -> Result<Box<dyn PreparedStatement + 'a>, BoxDynError>;

    async fn commit(self: Box<Self>) -> Result<(), BoxDynError>;

    async fn rollback(self: Box<Self>) -> Result<(), BoxDynError>;
}

/// A statement prepared inside a transaction, executed once per record in the batch.
#[async_trait]
pub trait PreparedStatement: Send + Sync {
    async fn execute(&mut self, params: &[ExecValue]) -> Result<(), BoxDynError>;

    async fn close(self: Box<Self>) -> Result<(), BoxDynError>;
}

/// Errors from a single batch publish attempt.
///
/// Every variant wraps whatever the underlying driver reported; none of them are retried by
/// [`crate::Sender`] itself; a failed publish instead falls back to re-queuing the batch.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PublishError {
    #[snafu(display("failed to begin transaction: {source}"))]
    Begin { source: BoxDynError },

    #[snafu(display("failed to prepare statement: {source}"))]
    Prepare { source: BoxDynError },

    #[snafu(display("failed to execute statement: {source}"))]
    Execute { source: BoxDynError },

    #[snafu(display("failed to close prepared statement: {source}"))]
    Close { source: BoxDynError },

    #[snafu(display("failed to commit transaction: {source}"))]
    Commit { source: BoxDynError },
}
