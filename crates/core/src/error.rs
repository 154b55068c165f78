//! Error types for the warcrepo repository
//!
//! `RepoError` is the unified error type returned by all repository APIs.
//! We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! Commit outcomes travel from a background copy worker to the waiting
//! caller, so `RepoError` implements `Clone`; the I/O variant clones by
//! error kind plus message.

use std::io;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for repository operations
pub type Result<T> = std::result::Result<T, RepoError>;

/// Error types for the warcrepo repository
#[derive(Debug, Error)]
pub enum RepoError {
    /// Null or malformed identifier, bad storage URL, negative size
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced artifact or storage URL does not resolve
    #[error("not found: {0}")]
    NotFound(String),

    /// Soft, non-fatal; commit is idempotent
    #[error("artifact already committed: {0}")]
    AlreadyCommitted(Uuid),

    /// WARC framing broken
    #[error("malformed WARC record in {context}: {detail}")]
    MalformedRecord {
        /// File (and offset where known) the bad record was read from
        context: String,
        /// What was wrong with the framing
        detail: String,
    },

    /// Underlying storage failure; caller decides retry
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Operation invoked in a state that does not permit it
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Second read of a single-consumption artifact payload
    #[error("artifact payload already consumed")]
    StreamAlreadyConsumed,
}

impl RepoError {
    /// Create an InvalidArgument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        RepoError::InvalidArgument(msg.into())
    }

    /// Create a NotFound error
    pub fn not_found(msg: impl Into<String>) -> Self {
        RepoError::NotFound(msg.into())
    }

    /// Create a MalformedRecord error
    pub fn malformed(context: impl Into<String>, detail: impl Into<String>) -> Self {
        RepoError::MalformedRecord {
            context: context.into(),
            detail: detail.into(),
        }
    }

    /// Create an IllegalState error
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        RepoError::IllegalState(msg.into())
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepoError::NotFound(_))
    }

    /// Check if this is a validation error (bad input; do not retry)
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, RepoError::InvalidArgument(_))
    }

    /// Check if this is a WARC framing error
    pub fn is_malformed(&self) -> bool {
        matches!(self, RepoError::MalformedRecord { .. })
    }

    /// Check if this error came from the underlying storage.
    ///
    /// I/O errors are the only kind a caller may reasonably retry.
    pub fn is_io(&self) -> bool {
        matches!(self, RepoError::Io(_))
    }
}

impl Clone for RepoError {
    fn clone(&self) -> Self {
        match self {
            RepoError::InvalidArgument(m) => RepoError::InvalidArgument(m.clone()),
            RepoError::NotFound(m) => RepoError::NotFound(m.clone()),
            RepoError::AlreadyCommitted(id) => RepoError::AlreadyCommitted(*id),
            RepoError::MalformedRecord { context, detail } => RepoError::MalformedRecord {
                context: context.clone(),
                detail: detail.clone(),
            },
            // io::Error is not Clone; preserve the kind and the message
            RepoError::Io(e) => RepoError::Io(io::Error::new(e.kind(), e.to_string())),
            RepoError::IllegalState(m) => RepoError::IllegalState(m.clone()),
            RepoError::StreamAlreadyConsumed => RepoError::StreamAlreadyConsumed,
        }
    }
}
