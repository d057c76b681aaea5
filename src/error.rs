//! Error types for the media inventory

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error kinds that can occur while scanning or persisting the inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanErrorKind {
    /// Permission denied when accessing a file or directory
    PermissionDenied,
    /// File or directory not found (including a missing store file on load)
    NotFound,
    /// I/O error during file operations
    IoError,
    /// The probe subprocess could not be launched or collected
    Probe,
    /// The persisted store file is not a readable document
    MalformedDocument,
    /// Path cannot be expressed as a file identity
    InvalidPath,
}

/// Represents an error that occurred during scanning or persistence
#[derive(Debug, Error)]
#[error("{kind:?}: {message} (path: {path:?})")]
pub struct ScanError {
    /// The kind of error
    pub kind: ScanErrorKind,
    /// The path where the error occurred
    pub path: Option<PathBuf>,
    /// Human-readable error message
    pub message: String,
}

pub type Result<T> = std::result::Result<T, ScanError>;

impl ScanError {
    /// Create a new error
    pub fn new(kind: ScanErrorKind, path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(path: PathBuf) -> Self {
        Self::new(
            ScanErrorKind::NotFound,
            Some(path.clone()),
            format!("Not found: {:?}", path),
        )
    }

    /// Wrap an I/O error, keeping the path it happened on
    pub fn io(path: &Path, err: std::io::Error) -> Self {
        let mut error = Self::from(err);
        error.path = Some(path.to_path_buf());
        error
    }

    /// Create a probe launch error
    pub fn probe(path: &Path, message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::Probe, Some(path.to_path_buf()), message)
    }

    /// Create a malformed document error
    pub fn malformed(path: &Path, message: impl Into<String>) -> Self {
        Self::new(
            ScanErrorKind::MalformedDocument,
            Some(path.to_path_buf()),
            message,
        )
    }

    /// Create an invalid path error
    pub fn invalid_path(path: &Path) -> Self {
        Self::new(
            ScanErrorKind::InvalidPath,
            Some(path.to_path_buf()),
            format!("Not an absolute file path: {:?}", path),
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ScanErrorKind::NotFound
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::PermissionDenied => ScanErrorKind::PermissionDenied,
            std::io::ErrorKind::NotFound => ScanErrorKind::NotFound,
            _ => ScanErrorKind::IoError,
        };
        Self::new(kind, None, err.to_string())
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ScanErrorKind::MalformedDocument, None, err.to_string())
    }
}
