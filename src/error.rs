//! Error types for archive operations.
//!
//! Every public operation returns [`Result<T>`]. Archive-level failures
//! (I/O, malformed structure, bad options) abort the whole call and leave
//! the archive on disk untouched. Per-entry problems are recorded on the
//! entry's [`EntryStatus`] instead, and only surface as
//! [`ArchiveError::Entry`] when strict mode is enabled.

use std::io;

use thiserror::Error;

use crate::zip::EntryStatus;

/// Errors that can occur while reading or rewriting a ZIP archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// I/O error on the archive, a temporary file or a destination file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record did not start with its expected signature.
    #[error("invalid {record} signature: expected {expected:#010x}, got {actual:#010x}")]
    InvalidSignature {
        record: &'static str,
        expected: u32,
        actual: u32,
    },

    /// No end of central directory record in the archive tail.
    #[error("no central directory found")]
    EocdNotFound,

    /// A fixed-size record was cut short.
    #[error("truncated {0}")]
    Truncated(&'static str),

    /// The central directory disagrees with the archive layout.
    #[error("corrupt central directory: {0}")]
    CorruptCentralDirectory(String),

    /// The archive needs ZIP64 extensions, which are not supported.
    #[error("ZIP64 archives are not supported")]
    Zip64Unsupported,

    /// Conflicting or invalid options.
    #[error("invalid options: {0}")]
    InvalidOption(String),

    /// A value does not fit the width of its format field.
    #[error("{field} value {value} exceeds the ZIP format limit")]
    FieldOverflow { field: &'static str, value: u64 },

    /// An entry failed while strict mode was enabled.
    #[error("entry '{name}' failed: {status}")]
    Entry { name: String, status: EntryStatus },
}

impl ArchiveError {
    /// Returns true for errors caused by malformed archive bytes.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature { .. }
                | Self::EocdNotFound
                | Self::Truncated(_)
                | Self::CorruptCentralDirectory(_)
                | Self::Zip64Unsupported
        )
    }

    pub(crate) fn option(msg: impl Into<String>) -> Self {
        Self::InvalidOption(msg.into())
    }
}

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;
