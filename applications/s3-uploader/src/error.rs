/// Application error types
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Watcher error: {0}")]
    Watch(#[from] s3u_watcher::WatchError),

    #[error("Upload error: {0}")]
    Upload(#[from] s3u_uploader::UploadError),

    #[error("Upload pool closed")]
    PoolClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}
