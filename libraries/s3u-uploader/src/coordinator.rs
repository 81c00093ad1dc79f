//! Per-key upload coordination
//!
//! Every upload registers a cancellation token under its destination key.
//! Starting an upload for a key that already has one in flight cancels the
//! old upload and replaces its registration in a single step, so at most one
//! token is registered per key. The new upload then waits until the
//! superseded transfer has released the key before it opens its file, which
//! keeps concurrent transfers for the same key off the sink and makes the
//! last caller's content the one that ends up stored.
//!
//! Cancellation is cooperative: the sink has to observe the token. A
//! superseded upload is reported as [`UploadOutcome::Superseded`], not as an
//! error.

use crate::error::{Result, UploadError};
use crate::sink::ObjectSink;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::fs::File;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How an upload ended, when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The file was stored under the key
    Completed { bytes: u64 },
    /// A newer upload for the same key took over
    Superseded,
}

/// Registration of an in-flight upload
struct InFlight {
    generation: u64,
    cancel: CancellationToken,
    /// Closes when the upload has released the key
    released: watch::Receiver<()>,
}

type InFlightMap = Mutex<HashMap<String, InFlight>>;

/// Serializes uploads per destination key
pub struct UploadCoordinator {
    sink: Arc<dyn ObjectSink>,
    in_flight: InFlightMap,
    next_generation: AtomicU64,
}

impl UploadCoordinator {
    pub fn new(sink: Arc<dyn ObjectSink>) -> Self {
        Self {
            sink,
            in_flight: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Upload the file at `local_path` under `key`
    ///
    /// Cancels any upload still running for `key` first.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or read, or the sink
    /// fails. Being superseded is not an error.
    pub async fn upload(&self, local_path: &Path, key: &str) -> Result<UploadOutcome> {
        let cancel = CancellationToken::new();
        let (registration, superseded) = self.register(key, cancel.clone());

        if let Some(mut superseded) = superseded {
            // Resolves once the previous upload has dropped its registration
            let _ = superseded.changed().await;
        }

        if cancel.is_cancelled() {
            debug!(path = %local_path.display(), key, "Upload superseded before start");
            return Ok(UploadOutcome::Superseded);
        }

        let result = self.transfer(local_path, key, &cancel).await;
        drop(registration);

        match result {
            Ok(bytes) => Ok(UploadOutcome::Completed { bytes }),
            Err(UploadError::Cancelled) => {
                debug!(path = %local_path.display(), key, "Upload superseded");
                Ok(UploadOutcome::Superseded)
            }
            Err(e) => Err(e),
        }
    }

    /// Number of keys with an upload in flight
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    /// Whether an upload for `key` is in flight
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    async fn transfer(&self, local_path: &Path, key: &str, cancel: &CancellationToken) -> Result<u64> {
        let file = File::open(local_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                UploadError::FileNotFound(local_path.display().to_string())
            } else {
                UploadError::Io(e)
            }
        })?;
        let bytes = file.metadata().await?.len();

        self.sink.put_object(key, file, cancel).await?;
        Ok(bytes)
    }

    /// Cancel whatever is registered under `key` and register `cancel`
    /// in its place
    fn register(
        &self,
        key: &str,
        cancel: CancellationToken,
    ) -> (Registration<'_>, Option<watch::Receiver<()>>) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (released_tx, released_rx) = watch::channel(());

        let mut in_flight = self.lock();
        let previous = in_flight.insert(
            key.to_string(),
            InFlight {
                generation,
                cancel,
                released: released_rx,
            },
        );

        let superseded = previous.map(|previous| {
            previous.cancel.cancel();
            warn!(key, "Upload canceled, superseded by a newer upload");
            previous.released
        });

        let registration = Registration {
            in_flight: &self.in_flight,
            key: key.to_string(),
            generation,
            _released: released_tx,
        };

        (registration, superseded)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes the registration when the upload ends, however it ends
struct Registration<'a> {
    in_flight: &'a InFlightMap,
    key: String,
    generation: u64,
    /// Dropped after the map entry is gone, waking the superseding upload
    _released: watch::Sender<()>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);

        // A newer upload may own the key by now
        if in_flight
            .get(&self.key)
            .is_some_and(|entry| entry.generation == self.generation)
        {
            in_flight.remove(&self.key);
        }
    }
}
