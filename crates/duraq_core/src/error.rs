//! Error types for the queue engine.

use std::io;
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur in queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Dequeue from an empty queue or segment.
    #[error("queue is empty")]
    Empty,

    /// Create called on a path that already exists.
    #[error("already exists: {path}")]
    AlreadyExists {
        /// The conflicting path.
        path: String,
    },

    /// Load called on a path that does not exist.
    #[error("not found: {path}")]
    NotFound {
        /// The missing path.
        path: String,
    },

    /// Another process holds the queue's lock file.
    #[error("queue locked: another process has exclusive access")]
    AlreadyLocked,

    /// Operation on a queue that has been closed.
    #[error("queue is closed")]
    AlreadyClosed,

    /// A segment file failed replay validation.
    #[error("segment corruption: {message}")]
    Corrupt {
        /// Description of the corruption.
        message: String,
    },

    /// I/O error from the file system.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record encoding or decoding failure.
    #[error("codec error: {0}")]
    Codec(#[from] duraq_codec::CodecError),
}

impl QueueError {
    /// Creates a corruption error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }

    /// Creates an already-exists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists { path: path.into() }
    }

    /// Creates a not-found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }
}
