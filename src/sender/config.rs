use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::dumper::{DeadLetterDumper, NullDumper};

const MIN_SEND_INTERVAL: Duration = Duration::from_millis(100);
const MIN_SEND_LIMIT: i64 = 1;
const MIN_MAX_ROTATED_FILES: usize = 1;
const DEFAULT_MAX_ROTATED_FILES: usize = 3;

/// Tunables for a [`crate::Sender`].
///
/// Built through [`SenderConfigBuilder`] rather than constructed directly, so that the floors on
/// `send_interval`, `send_limit` and `max_rotated_files` are always applied.
#[derive(Clone)]
pub struct SenderConfig {
    pub(crate) send_interval: Duration,
    pub(crate) send_limit: i64,
    pub(crate) use_memory_fallback: bool,
    pub(crate) file_workspace: PathBuf,
    pub(crate) max_rotated_files: usize,
    pub(crate) show_successful_info: bool,
    pub(crate) dead_letter_dumper: Arc<dyn DeadLetterDumper>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfigBuilder::default().build()
    }
}

/// Builder for [`SenderConfig`].
#[derive(Clone)]
pub struct SenderConfigBuilder {
    send_interval: Duration,
    send_limit: i64,
    use_memory_fallback: bool,
    file_workspace: PathBuf,
    max_rotated_files: usize,
    show_successful_info: bool,
    dead_letter_dumper: Arc<dyn DeadLetterDumper>,
}

impl Default for SenderConfigBuilder {
    fn default() -> Self {
        Self {
            send_interval: MIN_SEND_INTERVAL,
            send_limit: MIN_SEND_LIMIT,
            use_memory_fallback: true,
            file_workspace: std::env::temp_dir().join("sink-buffers"),
            max_rotated_files: DEFAULT_MAX_ROTATED_FILES,
            show_successful_info: false,
            dead_letter_dumper: Arc::new(NullDumper),
        }
    }
}

impl SenderConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// How often the background flusher wakes up to drain and publish a batch. Floored to 100ms.
    pub fn send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval.max(MIN_SEND_INTERVAL);
        self
    }

    /// Maximum records drained and published per flush cycle. Floored to 1.
    pub fn send_limit(mut self, limit: i64) -> Self {
        self.send_limit = limit.max(MIN_SEND_LIMIT);
        self
    }

    /// Whether a record falls back to the in-memory queue when the durable queue cannot accept it.
    pub fn use_memory_fallback(mut self, enabled: bool) -> Self {
        self.use_memory_fallback = enabled;
        self
    }

    /// Directory the durable queue files live in.
    pub fn file_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.file_workspace = workspace.into();
        self
    }

    /// How many rotated-aside copies of a corrupt queue file are kept before the oldest is
    /// deleted outright. Floored to 1.
    pub fn max_rotated_files(mut self, max: usize) -> Self {
        self.max_rotated_files = max.max(MIN_MAX_ROTATED_FILES);
        self
    }

    /// Whether a successful flush cycle logs an info-level summary.
    pub fn show_successful_info(mut self, show: bool) -> Self {
        self.show_successful_info = show;
        self
    }

    /// Where batches that survive neither pool are sent as a last resort.
    pub fn dead_letter_dumper(mut self, dumper: Arc<dyn DeadLetterDumper>) -> Self {
        self.dead_letter_dumper = dumper;
        self
    }

    pub fn build(self) -> SenderConfig {
        SenderConfig {
            send_interval: self.send_interval,
            send_limit: self.send_limit,
            use_memory_fallback: self.use_memory_fallback,
            file_workspace: self.file_workspace,
            max_rotated_files: self.max_rotated_files,
            show_successful_info: self.show_successful_info,
            dead_letter_dumper: self.dead_letter_dumper,
        }
    }
}
