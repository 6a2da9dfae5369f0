use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Custom error types for the image-dedup library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding error
    #[error("Image processing error: {0}")]
    Image(String),

    /// Scan root is missing or is not a directory
    #[error("Invalid scan root: {0}")]
    InvalidRoot(PathBuf),

    /// A single file could not be read or decoded
    #[error("Unreadable file {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Deleting a file through the undo ledger failed
    #[error("Failed to delete {path}: {reason}")]
    DeletionFailed { path: PathBuf, reason: String },

    /// Restoring a file from the undo ledger failed
    #[error("Failed to undo operation on {path}: {reason}")]
    UndoFailed { path: PathBuf, reason: String },

    /// Unknown error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

impl Error {
    pub(crate) fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Unreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
