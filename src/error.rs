//! Error types for pipebuf.

use std::io;
use thiserror::Error;

/// Result type alias for buffer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for buffer operations.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Operation on a closed buffer.
    #[error("Buffer is closed")]
    Closed,

    /// Appending to or creating a segment failed. Fatal: the block
    /// transitions to Closed.
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Reading from a segment that should exist failed, twice.
    /// Fatal: the block transitions to Closed.
    #[error("Read failed: {0}")]
    ReadFailed(String),

    /// A frame violates the length-prefix invariants somewhere other than
    /// the torn tail of the write segment (which is repaired on open).
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Buffer directory is locked by another process.
    #[error("Buffer directory is locked: {0}")]
    Locked(String),

    /// I/O error outside the read/write paths (directory listing,
    /// lock file plumbing, truncation during recovery).
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create a corruption error with the given message.
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        Error::Corruption(msg.into())
    }

    /// Create a write-path error from an I/O failure.
    pub fn write_failed(err: io::Error) -> Self {
        Error::WriteFailed(err.to_string())
    }

    /// Create a read-path error from an I/O failure.
    pub fn read_failed(err: io::Error) -> Self {
        Error::ReadFailed(err.to_string())
    }

    /// Check if this error closes the block.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::WriteFailed(_) | Error::ReadFailed(_) | Error::Corruption(_)
        )
    }

    /// Check if this error indicates corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}
