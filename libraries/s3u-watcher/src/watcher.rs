//! Polling watcher
//!
//! Runs the [`ChangeDetector`] against a [`MetadataSource`] on a fixed
//! interval and publishes [`ChangeEvent`]s on a bounded queue.
//!
//! Only one poll pass runs at a time; a tick that arrives while a pass is
//! still running is skipped. A full queue blocks the running pass, which in
//! turn delays the next one.
//!
//! Stopping cancels the timer and waits for the in-flight pass before the last
//! event sender is dropped, so the receiver only sees the end of the stream
//! once nothing can be sent any more.

use crate::detector::ChangeDetector;
use crate::source::MetadataSource;
use crate::types::{ChangeEvent, PollOutcome};
use crate::{Result, WatchError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Default poll interval in seconds
const DEFAULT_INTERVAL_SECS: u64 = 10;

/// Default event queue capacity
const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// Configuration for the polling watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Time between two poll passes
    pub interval: Duration,
    /// Capacity of the event queue
    pub queue_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// State shared between the watcher handle, the loop and its passes
struct Poller {
    source: Arc<dyn MetadataSource>,
    detector: ChangeDetector,
    scan_lock: Mutex<()>,
    event_tx: mpsc::Sender<ChangeEvent>,
    cancel: CancellationToken,
}

impl Poller {
    async fn poll(self: &Arc<Self>) -> Result<PollOutcome> {
        let Ok(_scan_guard) = self.scan_lock.try_lock() else {
            debug!("Previous poll still running, skipping");
            return Ok(PollOutcome::Skipped);
        };

        let poller = Arc::clone(self);
        let (events, report) = tokio::task::spawn_blocking(move || {
            let scan = poller.source.scan()?;
            Ok::<_, WatchError>(poller.detector.apply(scan))
        })
        .await
        .map_err(|e| WatchError::Task(e.to_string()))??;

        for event in events {
            tokio::select! {
                biased;
                sent = self.event_tx.send(event) => {
                    if sent.is_err() {
                        return Err(WatchError::EventsClosed);
                    }
                }
                () = self.cancel.cancelled() => {
                    debug!("Watcher stopping, dropping remaining events of this poll");
                    break;
                }
            }
        }

        debug!(
            files = report.files_seen,
            skipped = report.skipped,
            changed = report.changed,
            "Poll complete"
        );

        Ok(PollOutcome::Completed(report))
    }
}

/// Watches a tree by polling and reports files that settled after a change
pub struct PollingWatcher {
    config: WatcherConfig,
    /// Dropped on stop, which releases the handle's event sender
    poller: Option<Arc<Poller>>,
    event_rx: Option<mpsc::Receiver<ChangeEvent>>,
    task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl PollingWatcher {
    /// Create a watcher over `source`
    pub fn new(source: Arc<dyn MetadataSource>, config: WatcherConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.queue_capacity.max(1));
        let cancel = CancellationToken::new();

        let poller = Poller {
            source,
            detector: ChangeDetector::new(),
            scan_lock: Mutex::new(()),
            event_tx,
            cancel: cancel.clone(),
        };

        Self {
            config,
            poller: Some(Arc::new(poller)),
            event_rx: Some(event_rx),
            task: None,
            cancel,
        }
    }

    /// Start the background polling loop
    ///
    /// The first pass runs immediately, subsequent ones every interval.
    pub fn start(&mut self) -> Result<()> {
        if self.task.is_some() {
            return Err(WatchError::AlreadyStarted);
        }

        let poller = Arc::clone(self.poller.as_ref().ok_or(WatchError::Stopped)?);
        let interval = self.config.interval;
        let cancel = self.cancel.clone();

        info!(interval_secs = interval.as_secs_f64(), "Started polling");
        self.task = Some(tokio::spawn(run_poll_loop(poller, interval, cancel)));
        Ok(())
    }

    /// Stop polling and close the event queue
    ///
    /// Waits for a running pass to finish. Events already queued stay
    /// readable; the receiver yields `None` after them.
    pub async fn stop(&mut self) {
        self.cancel.cancel();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Polling task failed");
            }
        }

        if self.poller.take().is_some() {
            info!("Stopped polling");
        }
    }

    /// Take the event receiver
    ///
    /// This can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<ChangeEvent>> {
        self.event_rx.take()
    }

    /// Run a single poll pass now
    ///
    /// Returns [`PollOutcome::Skipped`] if another pass is running.
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let poller = self.poller.as_ref().ok_or(WatchError::Stopped)?;
        poller.poll().await
    }

    /// Number of paths ever observed
    pub fn tracked_count(&self) -> usize {
        self.poller
            .as_ref()
            .map_or(0, |poller| poller.detector.tracked_count())
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for PollingWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_poll_loop(poller: Arc<Poller>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut in_flight: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if in_flight.as_ref().is_some_and(|pass| !pass.is_finished()) {
                    debug!("Previous poll still running, skipping tick");
                    continue;
                }

                let poller = Arc::clone(&poller);
                in_flight = Some(tokio::spawn(async move {
                    if let Err(e) = poller.poll().await {
                        error!(error = %e, "File walk failed");
                    }
                }));
            }
        }
    }

    if let Some(pass) = in_flight {
        if let Err(e) = pass.await {
            error!(error = %e, "Poll pass failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use std::time::SystemTime;

    #[test]
    fn test_watcher_config_default() {
        let config = WatcherConfig::default();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.queue_capacity, 50);
    }

    #[tokio::test]
    async fn test_take_events_only_once() {
        let mut watcher =
            PollingWatcher::new(Arc::new(MemorySource::new()), WatcherConfig::default());

        assert!(watcher.take_events().is_some());
        assert!(watcher.take_events().is_none());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let mut watcher =
            PollingWatcher::new(Arc::new(MemorySource::new()), WatcherConfig::default());

        watcher.start().unwrap();
        assert!(watcher.is_running());
        assert!(matches!(watcher.start(), Err(WatchError::AlreadyStarted)));

        watcher.stop().await;
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_poll_after_stop_fails() {
        let source = Arc::new(MemorySource::new());
        source.insert("foo.txt", 3, SystemTime::UNIX_EPOCH);

        let mut watcher = PollingWatcher::new(source, WatcherConfig::default());
        let mut events = watcher.take_events().unwrap();

        watcher.stop().await;

        assert!(matches!(watcher.poll_once().await, Err(WatchError::Stopped)));
        assert!(matches!(watcher.start(), Err(WatchError::Stopped)));
        assert_eq!(watcher.tracked_count(), 0);
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_poll_is_skipped() {
        let source = Arc::new(MemorySource::new());
        let watcher = PollingWatcher::new(source, WatcherConfig::default());
        let poller = watcher.poller.as_ref().unwrap();

        let _held = poller.scan_lock.lock().await;
        assert_eq!(watcher.poll_once().await.unwrap(), PollOutcome::Skipped);
    }
}
