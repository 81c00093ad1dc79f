//! Error types for uploads.

use thiserror::Error;

/// Errors that can occur while uploading a file.
#[derive(Error, Debug)]
pub enum UploadError {
    /// IO error while reading the local file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Local file not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Object key could not be derived from the path
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// Object store rejected the request or could not be reached
    #[error("Transfer of {key} failed: {message}")]
    Transport { key: String, message: String },

    /// Object store client could not be configured
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upload was cancelled by a newer upload for the same key
    #[error("Upload cancelled")]
    Cancelled,
}

/// Result type for upload operations.
pub type Result<T> = std::result::Result<T, UploadError>;
