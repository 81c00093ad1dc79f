//! S3 Uploader
//!
//! Mirrors a local directory to an S3 bucket: a polling watcher reports files
//! that settled after a change, and a bounded pool uploads them under keys
//! derived from their path relative to the watched directory.
//!
//! This library exposes the core components for testing purposes.

pub mod config;
pub mod error;
pub mod mirror;
pub mod pool;

// Re-export commonly used types for convenience
pub use config::{AppConfig, ConfigOverrides};
pub use error::{AppError, Result};
pub use mirror::{run_s3, Mirror};
pub use pool::{StatsSnapshot, UploadJob, UploadPool};
