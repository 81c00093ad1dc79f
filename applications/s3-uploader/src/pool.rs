//! Bounded upload worker pool
//!
//! Jobs are run on their own task, at most `max_parallel` at a time.
//! Submitting waits for a free slot, which pushes back on the event queue
//! when uploads fall behind.

use crate::error::{AppError, Result};
use s3u_uploader::{UploadCoordinator, UploadOutcome};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// A file to upload and the key to store it under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub local_path: PathBuf,
    pub key: String,
}

impl UploadJob {
    pub fn new(local_path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            key: key.into(),
        }
    }
}

#[derive(Debug, Default)]
struct UploadStats {
    completed: AtomicU64,
    superseded: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

impl UploadStats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Counts of finished uploads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub completed: u64,
    pub superseded: u64,
    pub failed: u64,
    /// Changes dropped at shutdown without being uploaded
    pub discarded: u64,
}

impl StatsSnapshot {
    /// Uploads that ran, however they ended
    pub fn total(&self) -> u64 {
        self.completed + self.superseded + self.failed
    }
}

pub struct UploadPool {
    coordinator: Arc<UploadCoordinator>,
    permits: Arc<Semaphore>,
    max_parallel: usize,
    tasks: JoinSet<()>,
    stats: Arc<UploadStats>,
}

impl UploadPool {
    pub fn new(coordinator: Arc<UploadCoordinator>, max_parallel: usize) -> Self {
        let max_parallel = max_parallel.max(1);

        Self {
            coordinator,
            permits: Arc::new(Semaphore::new(max_parallel)),
            max_parallel,
            tasks: JoinSet::new(),
            stats: Arc::new(UploadStats::default()),
        }
    }

    /// Queue a job, waiting for a free slot first
    pub async fn submit(&mut self, job: UploadJob) -> Result<()> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AppError::PoolClosed)?;

        // Reap finished tasks so the set does not grow with every job
        while let Some(finished) = self.tasks.try_join_next() {
            if let Err(e) = finished {
                error!(error = %e, "Upload task failed");
            }
        }

        let coordinator = Arc::clone(&self.coordinator);
        let stats = Arc::clone(&self.stats);

        self.tasks.spawn(async move {
            let _permit = permit;
            debug!(path = %job.local_path.display(), key = %job.key, "Uploading file");

            match coordinator.upload(&job.local_path, &job.key).await {
                Ok(UploadOutcome::Completed { bytes }) => {
                    stats.completed.fetch_add(1, Ordering::Relaxed);
                    info!(path = %job.local_path.display(), key = %job.key, bytes, "File uploaded");
                }
                Ok(UploadOutcome::Superseded) => {
                    stats.superseded.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %job.key, "Upload replaced by a newer one");
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    error!(
                        path = %job.local_path.display(),
                        key = %job.key,
                        error = %e,
                        "Failed to upload file"
                    );
                }
            }
        });

        Ok(())
    }

    /// Uploads currently running
    ///
    /// A slot is held until its upload task ends, so this does not count
    /// finished tasks that were not reaped yet.
    pub fn active(&self) -> usize {
        self.max_parallel - self.permits.available_permits()
    }

    /// Count changes that were dropped instead of uploaded
    pub fn record_discarded(&self, count: u64) {
        self.stats.discarded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Wait for every submitted upload to finish
    pub async fn join(mut self) -> StatsSnapshot {
        self.permits.close();

        while let Some(finished) = self.tasks.join_next().await {
            if let Err(e) = finished {
                error!(error = %e, "Upload task failed");
            }
        }

        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s3u_uploader::MemorySink;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_pool_uploads_and_counts() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MemorySink::new());
        let mut pool = UploadPool::new(Arc::new(UploadCoordinator::new(sink.clone())), 2);

        for name in ["a.txt", "b.txt", "c.txt"] {
            let path = write_file(&dir, name, name.as_bytes());
            pool.submit(UploadJob::new(path, name)).await.unwrap();
        }
        pool.submit(UploadJob::new(dir.path().join("gone.txt"), "gone.txt"))
            .await
            .unwrap();

        let stats = pool.join().await;

        assert_eq!(stats.completed, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total(), 4);
        assert_eq!(sink.keys(), vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[tokio::test]
    async fn test_pool_limits_parallelism() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(
            MemorySink::new()
                .with_chunk_size(2)
                .with_chunk_delay(Duration::from_millis(10)),
        );
        let mut pool = UploadPool::new(Arc::new(UploadCoordinator::new(sink.clone())), 1);

        let first = write_file(&dir, "first.txt", b"first");
        let second = write_file(&dir, "second.txt", b"second");
        pool.submit(UploadJob::new(first, "first.txt")).await.unwrap();

        // With one slot, the second submit waits for the first upload
        pool.submit(UploadJob::new(second, "second.txt")).await.unwrap();
        assert!(sink.object("first.txt").is_some());

        let stats = pool.join().await;
        assert_eq!(stats.completed, 2);
    }

    #[tokio::test]
    async fn test_active_counts_running_uploads_only() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(
            MemorySink::new()
                .with_chunk_size(2)
                .with_chunk_delay(Duration::from_millis(10)),
        );
        let mut pool = UploadPool::new(Arc::new(UploadCoordinator::new(sink.clone())), 3);
        assert_eq!(pool.active(), 0);

        let path = write_file(&dir, "foo.txt", b"foo bar");
        pool.submit(UploadJob::new(path, "foo.txt")).await.unwrap();
        assert_eq!(pool.active(), 1);

        // The finished task is not reaped until the next submit or join
        for _ in 0..200 {
            if pool.active() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(pool.active(), 0);
        assert_eq!(pool.stats().completed, 1);

        pool.record_discarded(2);
        let stats = pool.join().await;
        assert_eq!(stats.discarded, 2);
        assert_eq!(stats.total(), 1);
    }
}
