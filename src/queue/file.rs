use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crc32fast::Hasher;
use parking_lot::Mutex;

use crate::error::QueueError;
use crate::record::Record;

use super::{clamp_limit, Backend, EjectOutcome, RecordFactory, DATA_OFFSET, MAX_RECORD_SIZE};

const HEADER_SIZE: u64 = DATA_OFFSET;

struct FileState {
    file: File,
    cursor: u64,
    count: usize,
    hasher: Hasher,
}

/// A single-file, crash-consistent FIFO of length-prefixed records.
///
/// See the crate-level documentation for the exact on-disk layout. Every `Push` and `Eject` call
/// is serialized behind one mutex; the file itself is the only shared mutable resource, so no
/// reader/writer split is needed.
pub struct DurableQueue {
    state: Mutex<FileState>,
    factory: RecordFactory,
}

impl std::fmt::Debug for DurableQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableQueue").finish_non_exhaustive()
    }
}

impl DurableQueue {
    /// Opens (creating if necessary) the queue file at `path`.
    ///
    /// `factory` is the "type witness": a closure that produces a fresh, still-empty instance of
    /// the concrete record type this queue holds, used to reconstruct records on `Eject`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidFile`] if the file is non-empty but its header CRC does not
    /// match the recomputed CRC of its data region, or it contains a malformed or truncated
    /// record. Returns [`QueueError::Io`] on any other I/O failure.
    pub fn open(path: impl AsRef<Path>, factory: RecordFactory) -> Result<Self, QueueError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(QueueError::io)?;

        let state = Self::load(&mut file)?;

        Ok(Self {
            state: Mutex::new(state),
            factory,
        })
    }

    fn load(file: &mut File) -> Result<FileState, QueueError> {
        let len = file.metadata().map_err(QueueError::io)?.len();

        if len == 0 {
            let mut header = [0u8; HEADER_SIZE as usize];
            header[4..12].copy_from_slice(&DATA_OFFSET.to_be_bytes());
            file.seek(SeekFrom::Start(0)).map_err(QueueError::io)?;
            file.write_all(&header).map_err(QueueError::io)?;
            return Ok(FileState {
                file: file.try_clone().map_err(QueueError::io)?,
                cursor: DATA_OFFSET,
                count: 0,
                hasher: Hasher::new(),
            });
        }

        if len < HEADER_SIZE {
            return Err(QueueError::invalid_file("file shorter than the 12-byte header"));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.seek(SeekFrom::Start(0)).map_err(QueueError::io)?;
        file.read_exact(&mut header).map_err(QueueError::io)?;

        let crc_stored = u32::from_be_bytes(header[0..4].try_into().unwrap());
        let cursor = u64::from_be_bytes(header[4..12].try_into().unwrap());

        if cursor < DATA_OFFSET || cursor > len {
            return Err(QueueError::invalid_file(format!(
                "consume cursor {cursor} out of bounds for a {len}-byte file"
            )));
        }

        let mut data = Vec::with_capacity((len - HEADER_SIZE) as usize);
        file.seek(SeekFrom::Start(DATA_OFFSET)).map_err(QueueError::io)?;
        file.read_to_end(&mut data).map_err(QueueError::io)?;

        let mut hasher = Hasher::new();
        hasher.update(&data);
        if hasher.clone().finalize() != crc_stored {
            return Err(QueueError::invalid_file(
                "recomputed CRC does not match the stored header CRC",
            ));
        }

        let mut pos = 0usize;
        let mut count = 0usize;
        while pos < data.len() {
            if pos + 2 > data.len() {
                return Err(QueueError::invalid_file("truncated record length prefix"));
            }
            let size = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
            pos += 2;

            if size == 0 || size > MAX_RECORD_SIZE {
                return Err(QueueError::invalid_file(format!(
                    "record declares invalid size {size}"
                )));
            }
            if pos + size > data.len() {
                return Err(QueueError::invalid_file("truncated record payload"));
            }
            pos += size;

            let end_offset = DATA_OFFSET + pos as u64;
            if end_offset > cursor {
                count += 1;
            }
        }

        Ok(FileState {
            file: file.try_clone().map_err(QueueError::io)?,
            cursor,
            count,
            hasher,
        })
    }
}

impl DurableQueue {
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

impl Backend for DurableQueue {
    fn push(&self, record: &dyn Record) -> Result<(), QueueError> {
        let payload = record.marshal();
        let size = payload.len();
        if size == 0 || size > MAX_RECORD_SIZE {
            return Err(QueueError::Oversize { size });
        }

        let mut state = self.state.lock();

        state.file.seek(SeekFrom::End(0)).map_err(QueueError::io)?;
        let size_be = (size as u16).to_be_bytes();
        state.file.write_all(&size_be).map_err(QueueError::io)?;
        state.file.write_all(&payload).map_err(QueueError::io)?;

        state.hasher.update(&size_be);
        state.hasher.update(&payload);
        let crc = state.hasher.clone().finalize();

        state.file.seek(SeekFrom::Start(0)).map_err(QueueError::io)?;
        state
            .file
            .write_all(&crc.to_be_bytes())
            .map_err(QueueError::io)?;

        state.count += 1;

        Ok(())
    }

    fn eject(&self, limit: i64) -> EjectOutcome {
        let mut state = self.state.lock();
        let n = clamp_limit(limit, state.count);
        if n == 0 {
            return EjectOutcome::ok(Vec::new());
        }

        let cursor = state.cursor;
        if let Err(e) = state.file.seek(SeekFrom::Start(cursor)) {
            return EjectOutcome {
                records: Vec::new(),
                error: Some(QueueError::io(e)),
            };
        }

        let mut records = Vec::with_capacity(n);
        let mut consumed = 0u64;
        let mut error = None;

        for _ in 0..n {
            let mut size_buf = [0u8; 2];
            if let Err(e) = state.file.read_exact(&mut size_buf) {
                error = Some(io_eject_error(e));
                break;
            }
            let size = u16::from_be_bytes(size_buf) as usize;
            if size == 0 || size > MAX_RECORD_SIZE {
                error = Some(QueueError::invalid_file(format!(
                    "record declares invalid size {size}"
                )));
                break;
            }

            let mut payload = vec![0u8; size];
            if let Err(e) = state.file.read_exact(&mut payload) {
                error = Some(io_eject_error(e));
                break;
            }

            let mut fresh = (self.factory)();
            if let Err(e) = fresh.unmarshal(&payload) {
                error = Some(QueueError::Decode { source: e });
                break;
            }

            consumed += 2 + size as u64;
            records.push(fresh);
        }

        if consumed > 0 {
            state.cursor += consumed;
            state.count -= records.len();

            let cursor_be = state.cursor.to_be_bytes();
            if let Err(e) = state
                .file
                .seek(SeekFrom::Start(4))
                .and_then(|_| state.file.write_all(&cursor_be))
            {
                if error.is_none() {
                    error = Some(QueueError::io(e));
                }
            }
        }

        EjectOutcome { records, error }
    }

    fn len(&self) -> usize {
        self.state.lock().count
    }
}

fn io_eject_error(e: io::Error) -> QueueError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        QueueError::invalid_file("record truncated at EOF")
    } else {
        QueueError::io(e)
    }
}
