//! Configuration options for pipebuf.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default target segment size (64MB).
pub const DEFAULT_FILE_SIZE: usize = 64 * 1024 * 1024;

/// Smallest sensible target segment size (1KB).
///
/// Smaller segments still work but churn through files on every frame.
pub const MIN_RECOMMENDED_FILE_SIZE: usize = 1024;

/// Default byte limit for the in-memory buffer (64MB).
pub const DEFAULT_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

/// Durability mode for segment appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Sync on every append (safest, slowest).
    Always,
    /// Sync when a segment is closed and on buffer close (default).
    /// A crash may lose frames still in the OS page cache; recovery
    /// truncates any torn tail.
    #[default]
    OnClose,
}

/// File buffer configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Directory holding the segment files. Created if absent.
    pub path: PathBuf,

    /// Target maximum size per segment in bytes. A segment may exceed
    /// this by at most one frame, because frames are never split.
    #[serde(default = "default_file_size")]
    pub file_size: usize,

    /// Durability mode for appends.
    #[serde(default)]
    pub sync_mode: SyncMode,
}

fn default_file_size() -> usize {
    DEFAULT_FILE_SIZE
}

impl Options {
    /// Create options for the given directory with default values.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file_size: DEFAULT_FILE_SIZE,
            sync_mode: SyncMode::default(),
        }
    }

    /// Validate the options.
    pub fn validate(&self) -> crate::Result<()> {
        if self.file_size == 0 {
            return Err(crate::Error::InvalidConfiguration(
                "file_size must be positive".into(),
            ));
        }

        if self.path.as_os_str().is_empty() {
            return Err(crate::Error::InvalidConfiguration(
                "path must not be empty".into(),
            ));
        }

        Ok(())
    }
}

/// Builder for Options.
#[derive(Debug, Clone)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Create a new builder for the given directory.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            options: Options::new(path),
        }
    }

    /// Set the target segment size.
    pub fn file_size(mut self, size: usize) -> Self {
        self.options.file_size = size;
        self
    }

    /// Set the durability mode.
    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.options.sync_mode = mode;
        self
    }

    /// Build the options.
    pub fn build(self) -> crate::Result<Options> {
        self.options.validate()?;
        Ok(self.options)
    }
}

/// Buffer selection, as it appears in a process configuration file.
///
/// Mirrors the shape `{"type": "file", "path": "...", ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BufferConfig {
    /// Durable file-backed buffer.
    File(Options),
    /// Volatile in-memory buffer.
    Memory {
        /// Maximum total encoded bytes held before push blocks.
        #[serde(default = "default_memory_limit")]
        limit: usize,
    },
}

fn default_memory_limit() -> usize {
    DEFAULT_MEMORY_LIMIT
}
