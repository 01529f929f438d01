//! Last-resort persistence for batches that could not be published and could not be re-queued
//! onto either the durable or the memory pool.
//!
//! This is the floor beneath the two-tier queue: by the time [`DeadLetterDumper::dump`] is
//! called, the data is already considered lost from the pool's point of view, and the dumper's
//! only job is to give an operator a chance to recover it after the fact, out of band.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::record::ExecValue;

/// A sink for batches that fell all the way through the durable and memory queues.
pub trait DeadLetterDumper: Send + Sync {
    /// Persists `rows`, each a record's positional parameters, under `statement_key`.
    fn dump(&self, statement_key: &str, rows: &[Vec<ExecValue>]);

    /// Pops and returns one previously dumped row, if any remain.
    ///
    /// Each call removes at most one recoverable entry, and silently discards (without returning)
    /// any entries it finds unreadable or undecodable along the way. A caller that wants
    /// everything calls this in a loop until it returns `None`; because corrupt entries are always
    /// removed before the next one is considered, that loop is guaranteed to terminate.
    fn restore_next(&self) -> Option<(String, Vec<ExecValue>)>;
}

/// Discards everything. The default when no other dumper is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDumper;

impl DeadLetterDumper for NullDumper {
    fn dump(&self, _statement_key: &str, _rows: &[Vec<ExecValue>]) {}

    fn restore_next(&self) -> Option<(String, Vec<ExecValue>)> {
        None
    }
}

type FailSaveFn = Box<dyn Fn(&str, &[ExecValue], &dyn std::error::Error) + Send + Sync>;
type FailOpenFn = Box<dyn Fn(&dyn std::error::Error) + Send + Sync>;

/// Writes each lost row to its own file under a base directory, one temp file per row.
pub struct FileDumper {
    base_path: PathBuf,
    on_save_failure: FailSaveFn,
    on_open_failure: FailOpenFn,
}

impl FileDumper {
    pub fn new(base_path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            on_save_failure: Box::new(|statement_key, _row, error| {
                warn!(statement_key, %error, "failed to dump lost row to disk");
            }),
            on_open_failure: Box::new(|error| {
                warn!(%error, "failed to read dead-letter dump directory");
            }),
        })
    }

    pub fn with_failure_hooks(
        base_path: impl Into<PathBuf>,
        on_save_failure: FailSaveFn,
        on_open_failure: FailOpenFn,
    ) -> std::io::Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            on_save_failure,
            on_open_failure,
        })
    }

    fn dump_one(&self, statement_key: &str, row: &[ExecValue]) -> std::io::Result<()> {
        let encoded = encode_row(statement_key, row);
        let mut file = tempfile::Builder::new().prefix("dump").tempfile_in(&self.base_path)?;
        file.write_all(&encoded)?;
        file.into_temp_path().keep().map_err(|e| e.error)?;
        Ok(())
    }
}

impl DeadLetterDumper for FileDumper {
    fn dump(&self, statement_key: &str, rows: &[Vec<ExecValue>]) {
        for row in rows {
            if let Err(e) = self.dump_one(statement_key, row) {
                (self.on_save_failure)(statement_key, row, &e);
            }
        }
    }

    fn restore_next(&self) -> Option<(String, Vec<ExecValue>)> {
        loop {
            let name = match first_entry(&self.base_path) {
                Ok(Some(name)) => name,
                Ok(None) => return None,
                Err(e) => {
                    (self.on_open_failure)(&e);
                    return None;
                }
            };

            let path = self.base_path.join(&name);
            let bytes = fs::read(&path);
            let _ = fs::remove_file(&path);

            match bytes.ok().and_then(|b| decode_row(&b)) {
                Some(parsed) => return Some(parsed),
                None => continue,
            }
        }
    }
}

fn first_entry(dir: &Path) -> std::io::Result<Option<std::ffi::OsString>> {
    for entry in fs::read_dir(dir)? {
        return Ok(Some(entry?.file_name()));
    }
    Ok(None)
}

fn encode_row(statement_key: &str, row: &[ExecValue]) -> Vec<u8> {
    let mut buf = Vec::new();
    let key_bytes = statement_key.as_bytes();
    buf.extend_from_slice(&(key_bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(key_bytes);
    buf.extend_from_slice(&(row.len() as u16).to_be_bytes());
    for value in row {
        encode_value(&mut buf, value);
    }
    buf
}

fn encode_value(buf: &mut Vec<u8>, value: &ExecValue) {
    match value {
        ExecValue::Null => buf.push(0),
        ExecValue::Bool(b) => {
            buf.push(1);
            buf.push(*b as u8);
        }
        ExecValue::I64(n) => {
            buf.push(2);
            buf.extend_from_slice(&n.to_be_bytes());
        }
        ExecValue::F64(f) => {
            buf.push(3);
            buf.extend_from_slice(&f.to_be_bytes());
        }
        ExecValue::String(s) => {
            buf.push(4);
            buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        ExecValue::Bytes(b) => {
            buf.push(5);
            buf.extend_from_slice(&(b.len() as u32).to_be_bytes());
            buf.extend_from_slice(b);
        }
    }
}

fn decode_row(data: &[u8]) -> Option<(String, Vec<ExecValue>)> {
    let mut pos = 0usize;
    let key_len = read_u32(data, &mut pos)? as usize;
    let key_bytes = read_slice(data, &mut pos, key_len)?;
    let statement_key = String::from_utf8(key_bytes.to_vec()).ok()?;

    let count = read_u16(data, &mut pos)? as usize;
    let mut row = Vec::with_capacity(count);
    for _ in 0..count {
        row.push(decode_value(data, &mut pos)?);
    }
    Some((statement_key, row))
}

fn decode_value(data: &[u8], pos: &mut usize) -> Option<ExecValue> {
    let tag = *data.get(*pos)?;
    *pos += 1;
    match tag {
        0 => Some(ExecValue::Null),
        1 => {
            let b = *data.get(*pos)?;
            *pos += 1;
            Some(ExecValue::Bool(b != 0))
        }
        2 => {
            let bytes: [u8; 8] = read_slice(data, pos, 8)?.try_into().ok()?;
            Some(ExecValue::I64(i64::from_be_bytes(bytes)))
        }
        3 => {
            let bytes: [u8; 8] = read_slice(data, pos, 8)?.try_into().ok()?;
            Some(ExecValue::F64(f64::from_be_bytes(bytes)))
        }
        4 => {
            let len = read_u32(data, pos)? as usize;
            let bytes = read_slice(data, pos, len)?;
            Some(ExecValue::String(String::from_utf8(bytes.to_vec()).ok()?))
        }
        5 => {
            let len = read_u32(data, pos)? as usize;
            Some(ExecValue::Bytes(read_slice(data, pos, len)?.to_vec()))
        }
        _ => None,
    }
}

fn read_u32(data: &[u8], pos: &mut usize) -> Option<u32> {
    let bytes: [u8; 4] = read_slice(data, pos, 4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

fn read_u16(data: &[u8], pos: &mut usize) -> Option<u16> {
    let bytes: [u8; 2] = read_slice(data, pos, 2)?.try_into().ok()?;
    Some(u16::from_be_bytes(bytes))
}

fn read_slice<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Option<&'a [u8]> {
    let end = pos.checked_add(len)?;
    let slice = data.get(*pos..end)?;
    *pos = end;
    Some(slice)
}
