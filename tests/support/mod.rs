use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use sink_buffers::{
    BoxDynError, Connection, ExecValue, PreparedStatement, Record, RecordDecodeError, Transaction,
};

/// A minimal record used across the integration tests: one statement key, one `i64` parameter.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TestRecord {
    pub statement: String,
    pub value: i64,
}

impl TestRecord {
    pub fn new(statement: impl Into<String>, value: i64) -> Self {
        Self {
            statement: statement.into(),
            value,
        }
    }
}

impl Record for TestRecord {
    fn statement_key(&self) -> &str {
        &self.statement
    }

    fn exec_params(&self) -> Vec<ExecValue> {
        vec![ExecValue::I64(self.value)]
    }

    fn marshal(&self) -> Bytes {
        let mut buf = Vec::with_capacity(4 + self.statement.len() + 8);
        buf.extend_from_slice(&(self.statement.len() as u32).to_be_bytes());
        buf.extend_from_slice(self.statement.as_bytes());
        buf.extend_from_slice(&self.value.to_be_bytes());
        Bytes::from(buf)
    }

    fn unmarshal(&mut self, payload: &[u8]) -> Result<(), RecordDecodeError> {
        if payload.len() < 4 {
            return Err(RecordDecodeError::msg("truncated test record header"));
        }
        let len = u32::from_be_bytes(payload[0..4].try_into().unwrap()) as usize;
        if payload.len() < 4 + len + 8 {
            return Err(RecordDecodeError::msg("truncated test record body"));
        }
        let statement = String::from_utf8(payload[4..4 + len].to_vec()).map_err(RecordDecodeError::new)?;
        let value = i64::from_be_bytes(payload[4 + len..4 + len + 8].try_into().unwrap());
        self.statement = statement;
        self.value = value;
        Ok(())
    }

    fn empty_instance(&self) -> Box<dyn Record> {
        Box::new(Self::default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordedExec {
    pub statement: String,
    pub params: Vec<Vec<ExecValue>>,
}

struct MockState {
    executed: Mutex<Vec<RecordedExec>>,
    fail_begin: AtomicBool,
    fail_execute: AtomicBool,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

/// An in-memory [`Connection`] that records every batch it is asked to publish, with switches to
/// simulate a failure at `begin` or `execute` time.
#[derive(Clone)]
pub struct MockConnection(Arc<MockState>);

impl MockConnection {
    pub fn new() -> Self {
        Self(Arc::new(MockState {
            executed: Mutex::new(Vec::new()),
            fail_begin: AtomicBool::new(false),
            fail_execute: AtomicBool::new(false),
            commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
        }))
    }

    pub fn set_fail_begin(&self, fail: bool) {
        self.0.fail_begin.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_execute(&self, fail: bool) {
        self.0.fail_execute.store(fail, Ordering::SeqCst);
    }

    pub fn executed(&self) -> Vec<RecordedExec> {
        self.0.executed.lock().unwrap().clone()
    }

    pub fn commits(&self) -> usize {
        self.0.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.0.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn begin(&self) -> Result<Box<dyn Transaction>, BoxDynError> {
        if self.0.fail_begin.load(Ordering::SeqCst) {
            return Err("mock connection: begin failed".into());
        }
        Ok(Box::new(MockTransaction {
            state: Arc::clone(&self.0),
            pending: None,
        }))
    }
}

struct MockTransaction {
    state: Arc<MockState>,
    pending: Option<RecordedExec>,
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn prepare<'a>(
        &'a mut self,
        statement: &str,
    ) -> Result<Box<dyn PreparedStatement + 'a>, BoxDynError> {
        self.pending = Some(RecordedExec {
            statement: statement.to_string(),
            params: Vec::new(),
        });
        Ok(Box::new(MockStatement { tx: self }))
    }

    async fn commit(self: Box<Self>) -> Result<(), BoxDynError> {
        if let Some(exec) = self.pending {
            self.state.executed.lock().unwrap().push(exec);
        }
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), BoxDynError> {
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockStatement<'a> {
    tx: &'a mut MockTransaction,
}

#[async_trait]
impl<'a> PreparedStatement for MockStatement<'a> {
    async fn execute(&mut self, params: &[ExecValue]) -> Result<(), BoxDynError> {
        if self.tx.state.fail_execute.load(Ordering::SeqCst) {
            return Err("mock connection: execute failed".into());
        }
        if let Some(exec) = self.tx.pending.as_mut() {
            exec.params.push(params.to_vec());
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), BoxDynError> {
        Ok(())
    }
}
