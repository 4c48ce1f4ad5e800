//! Error taxonomy shared by every layer of the archive engine.

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Malformed or truncated header, or an offset/identifier pointing outside it.
    #[error("Corrupt header: {0}")]
    CorruptHeader(String),

    #[error("Archive is closed")]
    ArchiveClosed,

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Decoding one entry failed. Bulk operations log this and move on.
    #[error("Payload of '{name}' is corrupt: {reason}")]
    PayloadCorrupt { name: String, reason: String },

    /// The recompressed payload does not fit in the slot the entry already owns.
    #[error("Replacement for '{name}' compresses to {compressed} B, slot holds {capacity} B")]
    PayloadTooLarge {
        name:       String,
        compressed: usize,
        capacity:   usize,
    },

    #[error("Entry '{name}' has type {type_tag} and cannot be replaced in place")]
    NotReplaceable { name: String, type_tag: i32 },

    #[error("Invalid filename pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ArchiveError {
    pub(crate) fn corrupt_header(msg: impl Into<String>) -> Self {
        ArchiveError::CorruptHeader(msg.into())
    }
}
