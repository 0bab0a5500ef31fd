//! Error types for archive operations.

use thiserror::Error;

/// Hard (programmer-level) errors raised by the archive.
///
/// Soft outcomes of the discovery process are events, not errors.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("malformed {kind} identifier: {raw:?}")]
    MalformedId { kind: &'static str, raw: String },

    #[error("{record} already carries id {id}; ids are assigned once, on entry")]
    IdAlreadyAssigned { record: &'static str, id: String },

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("no event introduces model {0}")]
    OriginNotFound(String),

    #[error("event sequence {0} is not in the development history")]
    EventNotFound(u64),

    #[error("no catalog element matches id {id} (version {version:?})")]
    ElementNotFound { id: String, version: Option<String> },

    #[error("no known result matches id {0}")]
    ResultNotFound(String),

    #[error("event {kind} rejected: {reason}")]
    InvalidEvent { kind: String, reason: String },

    #[error("archive digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("unsupported archive format version {0}")]
    UnsupportedFormat(u32),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;
