//! Centralized error types for pst2mbox.
//!
//! Errors are layered by how far they are allowed to travel: a
//! [`FieldDecodeError`] never leaves the field accessor, a
//! [`MessageConversionError`] never leaves the conversion driver, and a
//! [`ConvertError`] aborts the whole run.

use std::path::PathBuf;
use thiserror::Error;

/// A single field of a source record could not be decoded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldDecodeError {
    /// The stored bytes are not valid in the declared encoding.
    #[error("malformed {encoding} text")]
    MalformedText { encoding: String },

    /// The declared text encoding is unknown.
    #[error("unknown text encoding '{0}'")]
    UnknownEncoding(String),

    /// A binary payload is not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(String),

    /// A numeric value is negative, fractional or too large.
    #[error("value out of range: {0}")]
    OutOfRange(String),

    /// A timestamp could not be parsed.
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    /// The stored value has the wrong shape (e.g. a number where text was expected).
    #[error("expected {expected}, found {found}")]
    UnexpectedType {
        expected: &'static str,
        found: &'static str,
    },

    /// The attachment table has no usable entry at this index.
    #[error("no attachment at index {0}")]
    NoSuchAttachment(usize),
}

/// Convenience alias for field reads: `Ok(None)` means "absent".
pub type FieldResult<T> = std::result::Result<Option<T>, FieldDecodeError>;

/// A single message could not be converted. The run continues.
#[derive(Error, Debug)]
pub enum MessageConversionError {
    /// The source record itself is unreadable (e.g. not a JSON object).
    #[error("malformed source record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    /// A header value contains a line break and would corrupt the record.
    #[error("header '{name}' contains a line break")]
    HeaderInjection { name: String },

    /// A header value would be written with raw non-ASCII bytes.
    #[error("header '{name}' contains non-ASCII characters")]
    NonAsciiHeader { name: String },
}

/// Errors yielded by a source archive iterator.
#[derive(Error, Debug)]
pub enum SourceError {
    /// One record is unreadable; the following records may still be fine.
    #[error(transparent)]
    Record(#[from] MessageConversionError),

    /// The underlying archive could not be read any further.
    #[error("I/O error reading '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Fatal, run-level errors.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// The input file does not exist.
    #[error("Input file not found: {0}")]
    FileNotFound(PathBuf),

    /// A path exists but cannot be used (e.g. a directory).
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The source archive could not be opened.
    #[error("Failed to open source archive '{path}': {source}")]
    ArchiveOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The output archive could not be created, written or flushed.
    #[error("Failed to write output archive '{path}': {source}")]
    OutputWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Another process holds the lock on the output archive.
    #[error("Output archive is locked by another process: {0}")]
    OutputLocked(PathBuf),

    /// The user declined to overwrite an existing output file.
    #[error("Operation cancelled by user")]
    Cancelled,
}

/// Convenience alias for `Result<T, ConvertError>`.
pub type Result<T> = std::result::Result<T, ConvertError>;

impl ConvertError {
    /// Create an `OutputWrite` variant from a path and an `io::Error`.
    pub fn output(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::OutputWrite {
            path: path.into(),
            source,
        }
    }
}
