//! Flushes buffered records to a database on a timer, with a two-tier fallback when a publish
//! attempt fails.

mod config;
pub mod connection;
pub mod dumper;

pub use config::{SenderConfig, SenderConfigBuilder};
pub use connection::{BoxDynError, Connection, PreparedStatement, PublishError, Transaction};
pub use dumper::{DeadLetterDumper, FileDumper, NullDumper};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use snafu::{ResultExt, Snafu};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::QueueError;
use crate::pool::Pool;
use crate::queue::{Backend, FileLoader, MemoryQueue};
use crate::record::Record;

use connection::{BeginSnafu, CloseSnafu, CommitSnafu, ExecuteSnafu, PrepareSnafu};

/// Errors surfaced directly to a [`Sender::push`] caller.
#[derive(Debug, Snafu)]
pub enum PushError {
    #[snafu(display("sender is shutting down"))]
    ShuttingDown,

    #[snafu(display("writing to disk failed: {source}"))]
    Disk { source: QueueError },
}

struct PusherHandle {
    stop_tx: mpsc::Sender<bool>,
    task: JoinHandle<()>,
}

/// Buffers records in front of a database connection and flushes them in batches.
///
/// Every record is pushed to a durable, per-statement queue file first; if that fails and
/// [`SenderConfig::use_memory_fallback`] is set, it falls back to an in-memory queue instead of
/// being rejected outright. A background task wakes up every `send_interval`, drains the memory
/// queue before the durable one (volatile data is more urgent to get to safety), groups what it
/// drained by statement key, and publishes each group in its own transaction. A group that fails
/// to publish is re-queued: back to disk first, to memory only if disk is also unavailable, and to
/// the configured dead-letter dumper only if neither queue can take it.
pub struct Sender<C> {
    cfg: SenderConfig,
    file_pool: Arc<Pool>,
    memory_pool: Arc<Pool>,
    connection: Arc<C>,
    shutdown: Arc<AtomicBool>,
    runtime: Mutex<Option<PusherHandle>>,
}

impl<C> Sender<C>
where
    C: Connection + Send + Sync + 'static,
{
    pub fn new(connection: C, cfg: SenderConfig) -> Self {
        let loader = Arc::new(FileLoader::new(
            cfg.file_workspace.clone(),
            cfg.max_rotated_files,
        ));

        let file_pool = Arc::new(Pool::new(Arc::new(move |record: &dyn Record, factory| {
            loader
                .load(record.statement_key(), factory)
                .map(|queue| queue as Arc<dyn Backend>)
        })));

        let memory_pool = Arc::new(Pool::new(Arc::new(|_record: &dyn Record, factory| {
            Ok(Arc::new(MemoryQueue::new(factory)) as Arc<dyn Backend>)
        })));

        Self {
            cfg,
            file_pool,
            memory_pool,
            connection: Arc::new(connection),
            shutdown: Arc::new(AtomicBool::new(false)),
            runtime: Mutex::new(None),
        }
    }

    /// Routes `record` to the durable queue, falling back to memory per [`SenderConfig`].
    ///
    /// Returns [`PushError::ShuttingDown`] once [`Sender::stop`] has been called, even if the
    /// background task has not yet finished draining.
    pub fn push(&self, record: Box<dyn Record>) -> Result<(), PushError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return ShuttingDownSnafu.fail();
        }

        if let Err(e) = self.file_pool.push(record.as_ref()) {
            if self.cfg.use_memory_fallback {
                warn!(error = %e, "writing to disk failed");
                let _ = self.memory_pool.push(record.as_ref());
                return Ok(());
            }
            return Err(PushError::Disk { source: e });
        }

        Ok(())
    }

    /// Starts the background flush loop. Calling this more than once replaces any previously
    /// running loop without stopping it first.
    pub fn run_pusher(&self) {
        let file_pool = Arc::clone(&self.file_pool);
        let memory_pool = Arc::clone(&self.memory_pool);
        let connection = Arc::clone(&self.connection);
        let cfg = self.cfg.clone();

        let (stop_tx, mut stop_rx) = mpsc::channel::<bool>(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cfg.send_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        flush_cycle(&file_pool, &memory_pool, connection.as_ref(), &cfg, cfg.send_limit).await;
                    }
                    signal = stop_rx.recv() => {
                        let send_tail = signal.unwrap_or(false);
                        drain_on_stop(&file_pool, &memory_pool, connection.as_ref(), &cfg, send_tail).await;
                        return;
                    }
                }
            }
        });

        *self.runtime.lock() = Some(PusherHandle { stop_tx, task });
    }

    /// Signals the background loop to stop and waits for it to finish draining.
    ///
    /// When `send_tail` is true, everything still buffered (both queues) is published one last
    /// time before returning; records that fail that final publish are re-queued to disk, with no
    /// memory fallback, and dumped if even that fails. When `send_tail` is false, only the
    /// in-memory queue is flushed to disk for safekeeping; nothing is published.
    ///
    /// A no-op if [`Sender::run_pusher`] was never called.
    pub async fn stop(&self, send_tail: bool) {
        self.shutdown.store(true, Ordering::SeqCst);

        let handle = self.runtime.lock().take();
        if let Some(PusherHandle { stop_tx, task }) = handle {
            let _ = stop_tx.send(send_tail).await;
            let _ = task.await;
        }
    }
}

async fn flush_cycle<C: Connection + ?Sized>(
    file_pool: &Pool,
    memory_pool: &Pool,
    connection: &C,
    cfg: &SenderConfig,
    limit: i64,
) {
    let mut drained = match memory_pool.eject(limit) {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "problem ejecting queue from memory");
            Vec::new()
        }
    };

    let file_limit = if limit < 0 {
        -1
    } else {
        limit - drained.len() as i64
    };

    if limit < 0 || file_limit > 0 {
        match file_pool.eject(file_limit) {
            Ok(records) => drained.extend(records),
            Err(e) => warn!(error = %e, "problem ejecting queue from disk"),
        }
    }

    for (statement_key, records) in group_by_statement(drained) {
        let count = records.len();
        match publish(connection, &statement_key, &records).await {
            Ok(()) => {
                if cfg.show_successful_info {
                    info!(count, statement_key = %statement_key, "successfully sent");
                }
            }
            Err(e) => {
                warn!(error = %e, "publication ended with an error");
                fallback(
                    file_pool,
                    memory_pool,
                    cfg,
                    &statement_key,
                    records,
                    cfg.use_memory_fallback,
                );
            }
        }
    }
}

async fn drain_on_stop<C: Connection + ?Sized>(
    file_pool: &Pool,
    memory_pool: &Pool,
    connection: &C,
    cfg: &SenderConfig,
    send_tail: bool,
) {
    let memory_records = match memory_pool.eject(-1) {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "problem ejecting queue from memory");
            Vec::new()
        }
    };

    if !send_tail {
        if !memory_records.is_empty() {
            if let Err(e) = file_pool.append(&memory_records) {
                error!(
                    error = %e,
                    lost = memory_records.len(),
                    "data lost! fatal error writing to disk when stopping sender"
                );
            }
        }
        return;
    }

    let mut drained = memory_records;
    match file_pool.eject(-1) {
        Ok(records) => drained.extend(records),
        Err(e) => warn!(error = %e, "problem ejecting queue from disk"),
    }

    for (statement_key, records) in group_by_statement(drained) {
        if let Err(e) = publish(connection, &statement_key, &records).await {
            warn!(error = %e, "publication ended with an error");
            fallback(file_pool, memory_pool, cfg, &statement_key, records, false);
        }
    }
}

fn fallback(
    file_pool: &Pool,
    memory_pool: &Pool,
    cfg: &SenderConfig,
    statement_key: &str,
    records: Vec<Box<dyn Record>>,
    memory_safe: bool,
) {
    if let Err(e) = file_pool.append(&records) {
        if memory_safe {
            warn!(error = %e, "error when falling back a write to disk");
            let _ = memory_pool.append(&records);
        } else {
            error!(
                error = %e,
                lost = records.len(),
                statement_key,
                "data lost! fatal error when falling back a write to disk"
            );
            let rows: Vec<_> = records.iter().map(|r| r.exec_params()).collect();
            cfg.dead_letter_dumper.dump(statement_key, &rows);
        }
    }
}

async fn publish<C: Connection + ?Sized>(
    connection: &C,
    statement_key: &str,
    records: &[Box<dyn Record>],
) -> Result<(), PublishError> {
    let mut tx = connection.begin().await.context(BeginSnafu)?;

    let exec_result: Result<(), PublishError> = async {
        let mut stmt = tx.prepare(statement_key).await.context(PrepareSnafu)?;
        for record in records {
            stmt.execute(&record.exec_params()).await.context(ExecuteSnafu)?;
        }
        stmt.close().await.context(CloseSnafu)?;
        Ok(())
    }
    .await;

    match exec_result {
        Ok(()) => tx.commit().await.context(CommitSnafu),
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %rollback_err, "problem rolling back a transaction");
            }
            Err(e)
        }
    }
}

fn group_by_statement(records: Vec<Box<dyn Record>>) -> Vec<(String, Vec<Box<dyn Record>>)> {
    let mut order = Vec::new();
    let mut groups: HashMap<String, Vec<Box<dyn Record>>> = HashMap::new();

    for record in records {
        let key = record.statement_key().to_string();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(record);
    }

    order
        .into_iter()
        .map(|key| {
            let records = groups.remove(&key).unwrap_or_default();
            (key, records)
        })
        .collect()
}
