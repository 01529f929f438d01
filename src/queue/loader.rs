use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::QueueError;

use super::{DurableQueue, RecordFactory};

const DEFAULT_MAX_HISTORY: usize = 3;

/// Resolves a statement key to its durable queue file under a workspace directory, rotating a
/// corrupt file aside and retrying once before giving up.
///
/// Queue files are named `{hash}_{generation}.bd` (the live file, always generation 0) or
/// `{hash}_{generation}.carapted` (a file rotated aside after failing validation), where `hash` is
/// the `adler32` checksum of the statement key. Rotating a file aside that collides with an
/// existing rotated file pushes the existing one to the next generation first, recursively, until
/// either a free generation slot is found or a file at or past `max_history` generations is
/// deleted outright.
pub struct FileLoader {
    workspace: PathBuf,
    max_history: usize,
}

impl FileLoader {
    /// `max_history` is floored to 1: a workspace always retains at least the file currently being
    /// rotated out.
    pub fn new(workspace: impl Into<PathBuf>, max_history: usize) -> Self {
        Self {
            workspace: workspace.into(),
            max_history: max_history.max(1),
        }
    }

    pub fn with_default_history(workspace: impl Into<PathBuf>) -> Self {
        Self::new(workspace, DEFAULT_MAX_HISTORY)
    }

    /// Opens the durable queue file for `statement_key`, transparently rotating aside and
    /// recreating it once if the existing file fails validation.
    pub fn load(
        &self,
        statement_key: &str,
        factory: RecordFactory,
    ) -> Result<Arc<DurableQueue>, QueueError> {
        let hash = adler32::adler32(Cursor::new(statement_key.as_bytes())).map_err(QueueError::io)?;
        let active_path = self.workspace.join(build_name(&hash.to_string(), "bd", 0));

        match DurableQueue::open(&active_path, Arc::clone(&factory)) {
            Ok(queue) => Ok(Arc::new(queue)),
            Err(QueueError::InvalidFile { .. }) => {
                self.rotate_aside(&active_path)?;
                DurableQueue::open(&active_path, factory).map(Arc::new)
            }
            Err(e) => Err(e),
        }
    }

    fn rotate_aside(&self, active_path: &Path) -> Result<(), QueueError> {
        let (name, _, n) = parse_name(active_path).expect("active queue file name is well-formed");
        let carapted_path = self.workspace.join(build_name(&name, "carapted", n));
        self.move_aside(active_path, &carapted_path)
    }

    fn move_aside(&self, prev: &Path, next: &Path) -> Result<(), QueueError> {
        if next.exists() {
            let (name, ext, n) = parse_name(next).expect("rotated queue file name is well-formed");
            let bumped = self.workspace.join(build_name(&name, &ext, n + 1));
            self.move_aside(next, &bumped)?;
        }

        let (_, _, target_gen) = parse_name(next).expect("queue file name is well-formed");
        if target_gen >= self.max_history {
            fs::remove_file(prev).map_err(QueueError::io)
        } else {
            fs::rename(prev, next).map_err(QueueError::io)
        }
    }
}

fn build_name(name: &str, ext: &str, n: usize) -> String {
    format!("{name}_{n}.{ext}")
}

fn parse_name(path: &Path) -> Option<(String, String, usize)> {
    let file_name = path.file_name()?.to_str()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    if ext != "bd" && ext != "carapted" {
        return None;
    }
    let (name, n) = stem.rsplit_once('_')?;
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((name.to_string(), ext.to_string(), n.parse().ok()?))
}
