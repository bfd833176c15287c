//! Error types for scene cache operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::util::Path;

/// Coarse classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Programmer error: wrong open mode, out-of-order writes, reopened children.
    Usage,
    /// A requested location, sample or link target does not exist.
    NotFound,
    /// Stored or supplied data cannot be used as requested.
    Data,
    /// Failure in the backing file.
    Io,
}

/// Main error type for scene cache operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Operation not available in the store's open mode.
    #[error("{op} is not available on a {mode} store (at {path})")]
    WrongMode {
        op: &'static str,
        mode: &'static str,
        path: Path,
    },

    /// A sample was written at a time not after the previous one.
    #[error("{property} sample at time {time} written after time {previous} at {path}")]
    TimeOrder {
        path: Path,
        property: String,
        time: f64,
        previous: f64,
    },

    /// A sample was written at a NaN or infinite time.
    #[error("{property} sample at non-finite time {time} at {path}")]
    NonFiniteTime {
        path: Path,
        property: String,
        time: f64,
    },

    /// `createChild` on a name that already exists.
    #[error("child '{name}' already exists at {path}")]
    ChildExists { path: Path, name: String },

    /// Write-mode location already finalized.
    #[error("location {0} has been finalized and cannot be modified")]
    Finalized(Path),

    /// A child of the location is still open for writing.
    #[error("cannot finalize {path}: child '{child}' is still open")]
    ChildOpen { path: Path, child: String },

    /// Write attempted at a location whose content comes from a linked scene.
    #[error("cannot write through linked location {0}")]
    CompositedWrite(Path),

    /// `CreateIfMissing` on a read-mode store.
    #[error("cannot create child '{name}' at {path}: store is read-only")]
    CreateInReadMode { path: Path, name: String },

    /// Child lookup failed under `ThrowIfMissing`.
    #[error("no child '{name}' at {path}")]
    ChildNotFound { path: Path, name: String },

    /// Attribute lookup failed.
    #[error("no attribute '{name}' at {path}")]
    AttributeNotFound { path: Path, name: String },

    /// Requested sample does not exist.
    #[error("no {property} sample {index} at {path} ({count} stored)")]
    NoSample {
        path: Path,
        property: String,
        index: usize,
        count: usize,
    },

    /// Linked file does not exist.
    #[error("link target file not found: {0}")]
    LinkTargetNotFound(PathBuf),

    /// Root path inside the linked file does not exist.
    #[error("link root {root} not found in {file}")]
    LinkRootNotFound { file: PathBuf, root: Path },

    /// File does not exist or cannot be accessed.
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// Two samples cannot be interpolated.
    #[error("cannot interpolate {property} at {path}: {reason}")]
    Interpolation {
        path: Path,
        property: String,
        reason: String,
    },

    /// Stored link descriptor has the wrong shape.
    #[error("malformed link at {path}: {reason}")]
    MalformedLink { path: Path, reason: String },

    /// Sample counts or shapes disagree.
    #[error("sample mismatch: {0}")]
    SampleMismatch(String),

    /// Value type not accepted by the operation.
    #[error("unsupported type: expected {expected}, got {actual}")]
    UnsupportedType {
        expected: &'static str,
        actual: &'static str,
    },

    /// Invalid magic bytes at start of file.
    #[error("invalid scene cache file: bad magic bytes")]
    InvalidMagic,

    /// File is truncated or corrupted.
    #[error("unexpected end of data at position {0}")]
    UnexpectedEof(u64),

    /// Invalid data structure in file.
    #[error("invalid file structure: {0}")]
    InvalidStructure(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid structure error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    /// Create an interpolation error.
    pub fn interpolation(path: &Path, property: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Interpolation {
            path: path.clone(),
            property: property.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WrongMode { .. }
            | Self::TimeOrder { .. }
            | Self::NonFiniteTime { .. }
            | Self::ChildExists { .. }
            | Self::Finalized(_)
            | Self::ChildOpen { .. }
            | Self::CompositedWrite(_)
            | Self::CreateInReadMode { .. } => ErrorKind::Usage,
            Self::ChildNotFound { .. }
            | Self::AttributeNotFound { .. }
            | Self::NoSample { .. }
            | Self::LinkTargetNotFound(_)
            | Self::LinkRootNotFound { .. }
            | Self::FileNotFound(_) => ErrorKind::NotFound,
            Self::Interpolation { .. }
            | Self::MalformedLink { .. }
            | Self::SampleMismatch(_)
            | Self::UnsupportedType { .. }
            | Self::InvalidMagic
            | Self::UnexpectedEof(_)
            | Self::InvalidStructure(_) => ErrorKind::Data,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// Result type alias for scene cache operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::TimeOrder {
            path: Path::parse("/a/b"),
            property: "object".into(),
            time: 0.5,
            previous: 1.0,
        };
        let msg = e.to_string();
        assert!(msg.contains("/a/b"));
        assert!(msg.contains("0.5"));
        assert_eq!(e.kind(), ErrorKind::Usage);

        let e = Error::NoSample {
            path: Path::root(),
            property: "bound".into(),
            index: 5,
            count: 3,
        };
        assert!(e.to_string().contains('5'));
        assert_eq!(e.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
