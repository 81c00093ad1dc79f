//! Watcher to uploader wiring
//!
//! Every change event is turned into an upload of `root/<path>` under the
//! key derived from `<path>`. Shutdown stops the watcher, drops whatever is
//! still queued and waits for uploads that already started.

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::pool::{StatsSnapshot, UploadJob, UploadPool};
use s3u_uploader::{object_key, ObjectSink, S3Sink, UploadCoordinator};
use s3u_watcher::{ChangeEvent, LocalSource, MetadataSource, PollingWatcher, WatcherConfig};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Mirror {
    root: PathBuf,
    watcher: PollingWatcher,
    pool: UploadPool,
}

impl Mirror {
    /// Mirror the files reported by `source`, relative to `root`, into `sink`
    pub fn new(
        root: impl Into<PathBuf>,
        source: Arc<dyn MetadataSource>,
        sink: Arc<dyn ObjectSink>,
        watcher_config: WatcherConfig,
        parallel_uploads: usize,
    ) -> Self {
        let coordinator = Arc::new(UploadCoordinator::new(sink));

        Self {
            root: root.into(),
            watcher: PollingWatcher::new(source, watcher_config),
            pool: UploadPool::new(coordinator, parallel_uploads),
        }
    }

    /// Run until `shutdown` resolves
    pub async fn run<F>(mut self, shutdown: F) -> Result<StatsSnapshot>
    where
        F: Future<Output = ()>,
    {
        let mut events = self
            .watcher
            .take_events()
            .ok_or_else(|| AppError::Internal("event queue already taken".into()))?;

        self.watcher.start()?;
        info!(root = %self.root.display(), "Mirroring directory");

        tokio::pin!(shutdown);

        // Changes taken off the queue but never handed to the pool
        let mut discarded = 0u64;

        loop {
            let event = tokio::select! {
                () = &mut shutdown => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let Some(job) = self.job_for(&event) else {
                continue;
            };

            tokio::select! {
                () = &mut shutdown => {
                    discarded += 1;
                    break;
                }
                submitted = self.pool.submit(job) => submitted?,
            }
        }

        info!("Shutting down");
        self.watcher.stop().await;

        while events.recv().await.is_some() {
            discarded += 1;
        }
        if discarded > 0 {
            warn!(discarded, "Discarded queued changes at shutdown");
            self.pool.record_discarded(discarded);
        }

        let stats = self.pool.join().await;
        info!(
            completed = stats.completed,
            superseded = stats.superseded,
            failed = stats.failed,
            "Uploads finished"
        );

        Ok(stats)
    }

    fn job_for(&self, event: &ChangeEvent) -> Option<UploadJob> {
        match object_key(&event.path) {
            Ok(key) => {
                debug!(path = %event.path.display(), key = %key, "Change detected");
                Some(UploadJob::new(self.root.join(&event.path), key))
            }
            Err(e) => {
                warn!(path = %event.path.display(), error = %e, "Skipping file without a valid key");
                None
            }
        }
    }
}

/// Mirror the configured directory into the configured S3 bucket
pub async fn run_s3<F>(config: &AppConfig, shutdown: F) -> Result<StatsSnapshot>
where
    F: Future<Output = ()>,
{
    let root: &Path = &config.watch.directory;
    let source = LocalSource::new(root).follow_links(config.watch.follow_links);
    let sink = S3Sink::connect(&config.s3).await?;

    info!(bucket = %sink.bucket(), region = %config.s3.region, "Connected to S3");

    Mirror::new(
        root,
        Arc::new(source),
        Arc::new(sink),
        config.watcher_config(),
        config.upload.parallel_uploads,
    )
    .run(shutdown)
    .await
}
