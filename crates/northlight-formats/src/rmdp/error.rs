//! Error types for package metadata parsing, payload streaming and packing

use std::path::PathBuf;
use thiserror::Error;

/// Kind of directory record an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Folder record
    Folder,
    /// File record
    File,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Folder => write!(f, "folder"),
            Self::File => write!(f, "file"),
        }
    }
}

/// Broad classification of [`RmdpError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Unknown endianness or version tag
    Format,
    /// Stored checksum does not match recomputed checksum
    Corruption,
    /// Fewer bytes available than declared
    Integrity,
    /// Name bytes are not valid UTF-8
    Decode,
    /// Caller precondition or broken record linkage
    Lookup,
    /// Underlying I/O failure
    Io,
}

/// Errors that can occur when reading, extracting or packing RMDP packages
#[derive(Error, Debug)]
pub enum RmdpError {
    /// Unknown endianness tag in the first header byte
    #[error("Invalid endianness tag: {0}")]
    InvalidEndianness(u8),

    /// Unknown package version tag
    #[error("Unsupported package version: {0}")]
    UnsupportedVersion(u32),

    /// Name checksum stored in a record does not match its name
    #[error(
        "Invalid checksum for {kind} name {name:?}, package may be corrupted (expected: {expected:#010x}, got: {actual:#010x})"
    )]
    NameChecksumMismatch {
        /// Record kind
        kind: EntryKind,
        /// Resolved name
        name: String,
        /// Checksum stored in the record
        expected: u32,
        /// Checksum computed from the name
        actual: u32,
    },

    /// Payload checksum does not match the stored data checksum
    #[error(
        "Invalid checksum for file data {name:?}, package may be corrupted (expected: {expected:#010x}, got: {actual:#010x})"
    )]
    DataChecksumMismatch {
        /// File name
        name: String,
        /// Checksum stored in the file record
        expected: u32,
        /// Checksum computed from the payload
        actual: u32,
    },

    /// Payload blob ended before the declared file size
    #[error("Truncated payload for {name:?}: expected {expected} bytes, got {actual}")]
    TruncatedPayload {
        /// File name
        name: String,
        /// Declared size
        expected: u64,
        /// Bytes actually available
        actual: u64,
    },

    /// Source file was shorter than its reported size while packing
    #[error("Short read from {}: expected {expected} bytes, got {actual}", path.display())]
    TruncatedSource {
        /// Source file path
        path: PathBuf,
        /// Size reported by the filesystem
        expected: u64,
        /// Bytes actually read
        actual: u64,
    },

    /// Name block ended before a NUL terminator was found
    #[error("Unterminated name at name block offset {offset}")]
    UnterminatedName {
        /// Offset into the name block
        offset: u64,
    },

    /// Name offset or length points outside the metadata file
    #[error("Name block offset {offset} is outside a {length} byte name block")]
    InvalidNameOffset {
        /// Offset into the name block
        offset: u64,
        /// Declared name block length
        length: u32,
    },

    /// Name bytes are not valid UTF-8
    #[error("Invalid UTF-8 name at name block offset {offset}: {source}")]
    InvalidName {
        /// Offset into the name block
        offset: u64,
        /// Conversion error
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// Folder path was not registered before use
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// File path not present in the package
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Folder index out of range
    #[error("Invalid folder id: {0}")]
    InvalidFolderId(u64),

    /// Parent chain loops back on itself
    #[error("Folder {0} has a cyclic parent chain")]
    FolderCycle(usize),

    /// Sibling or child links do not describe a tree
    #[error("Invalid record linkage: {0}")]
    InvalidLinkage(String),

    /// Path cannot be represented inside a package
    #[error("Invalid package path: {0}")]
    InvalidPath(String),

    /// More records than a 32-bit count can hold
    #[error("Too many {kind} records: {count}")]
    TooManyEntries {
        /// Record kind
        kind: EntryKind,
        /// Number of records
        count: usize,
    },

    /// Name block exceeds the 32-bit length field
    #[error("Name block too large: {0} bytes")]
    NameBlockTooLarge(usize),

    /// Timestamp outside the FILETIME range
    #[error("Timestamp out of FILETIME range: {0}")]
    InvalidTimestamp(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `BinRw` parsing/writing error
    #[error("Binary format error: {0}")]
    BinRw(#[from] binrw::Error),

    /// Directory traversal failed while packing
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl RmdpError {
    /// Classify the error
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidEndianness(_) | Self::UnsupportedVersion(_) => ErrorCategory::Format,
            Self::NameChecksumMismatch { .. } | Self::DataChecksumMismatch { .. } => {
                ErrorCategory::Corruption
            }
            Self::TruncatedPayload { .. }
            | Self::TruncatedSource { .. }
            | Self::UnterminatedName { .. }
            | Self::InvalidNameOffset { .. } => ErrorCategory::Integrity,
            Self::InvalidName { .. } => ErrorCategory::Decode,
            Self::FolderNotFound(_)
            | Self::FileNotFound(_)
            | Self::InvalidFolderId(_)
            | Self::FolderCycle(_)
            | Self::InvalidLinkage(_)
            | Self::InvalidPath(_)
            | Self::TooManyEntries { .. }
            | Self::NameBlockTooLarge(_)
            | Self::InvalidTimestamp(_) => ErrorCategory::Lookup,
            Self::Io(_) | Self::BinRw(_) | Self::Walk(_) => ErrorCategory::Io,
        }
    }
}

/// Type alias for RMDP operation results
pub type Result<T> = std::result::Result<T, RmdpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RmdpError::UnsupportedVersion(99);
        assert_eq!(err.to_string(), "Unsupported package version: 99");

        let err = RmdpError::NameChecksumMismatch {
            kind: EntryKind::Folder,
            name: "data".to_string(),
            expected: 1,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "Invalid checksum for folder name \"data\", package may be corrupted (expected: 0x00000001, got: 0x00000002)"
        );
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            RmdpError::InvalidEndianness(3).category(),
            ErrorCategory::Format
        );
        assert_eq!(
            RmdpError::DataChecksumMismatch {
                name: "a".to_string(),
                expected: 0,
                actual: 1,
            }
            .category(),
            ErrorCategory::Corruption
        );
        assert_eq!(
            RmdpError::TruncatedPayload {
                name: "a".to_string(),
                expected: 2,
                actual: 1,
            }
            .category(),
            ErrorCategory::Integrity
        );
        assert_eq!(
            RmdpError::FolderNotFound("x".to_string()).category(),
            ErrorCategory::Lookup
        );
        let io = std::io::Error::other("boom");
        assert_eq!(RmdpError::from(io).category(), ErrorCategory::Io);
    }
}
