//! S3 Uploader upload coordination
//!
//! Streams local files to an object store under a key, making sure that a new
//! upload for a key supersedes the one still in flight for it.
//!
//! # Features
//!
//! - **Coordination**: per-key cancellation with last-writer-wins supersession
//! - **S3**: streaming `PutObject` through the AWS SDK
//! - **Keys**: object keys derived from paths relative to the watch root
//!
//! # Example
//!
//! ```ignore
//! use s3u_uploader::{object_key, S3Settings, S3Sink, UploadCoordinator};
//! use std::sync::Arc;
//!
//! let settings = S3Settings::new("eu-central-1", "my-bucket");
//! let sink = S3Sink::connect(&settings).await?;
//! let coordinator = UploadCoordinator::new(Arc::new(sink));
//!
//! let key = object_key("logs/./app.log".as_ref())?;
//! coordinator.upload("/var/log/app/logs/app.log".as_ref(), &key).await?;
//! ```

mod error;

pub mod coordinator;
pub mod key;
pub mod s3;
pub mod sink;

pub use coordinator::{UploadCoordinator, UploadOutcome};
pub use error::{Result, UploadError};
pub use key::object_key;
pub use s3::{S3Settings, S3Sink};
pub use sink::{MemorySink, ObjectSink};
