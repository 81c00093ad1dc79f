//! Object storage sinks
//!
//! A sink stores the full contents of a file under a key. Cancellation is
//! cooperative: implementations must watch the token and return
//! [`UploadError::Cancelled`] promptly once it fires.

use crate::error::{Result, UploadError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

/// Default read size for in-memory transfers
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Destination capable of storing a byte stream under a key
#[async_trait]
pub trait ObjectSink: Send + Sync {
    /// Store the whole of `body` under `key`
    ///
    /// # Errors
    /// Returns [`UploadError::Cancelled`] if `cancel` fired before the object
    /// was stored, or a transport/IO error.
    async fn put_object(&self, key: &str, body: File, cancel: &CancellationToken) -> Result<()>;
}

/// Sink keeping objects in memory
///
/// The body is read in chunks and stored in one step once fully read, so a
/// cancelled transfer never leaves a partial object behind.
#[derive(Debug)]
pub struct MemorySink {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    chunk_size: usize,
    /// Pause after every chunk, to keep transfers in flight
    chunk_delay: Option<Duration>,
    active: Mutex<HashMap<String, usize>>,
    max_active_per_key: AtomicUsize,
    puts: AtomicUsize,
    cancelled: AtomicUsize,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: None,
            active: Mutex::new(HashMap::new()),
            max_active_per_key: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        }
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the read size per chunk
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Pause after every chunk
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Contents stored under `key`
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(key).cloned()
    }

    /// All stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.objects).keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of transfers started
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of transfers that ended by cancellation
    pub fn cancelled_count(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous transfers seen for a single key
    pub fn max_active_per_key(&self) -> usize {
        self.max_active_per_key.load(Ordering::SeqCst)
    }

    fn begin(&self, key: &str) -> ActiveTransfer<'_> {
        self.puts.fetch_add(1, Ordering::SeqCst);

        let mut active = lock(&self.active);
        let count = active.entry(key.to_string()).or_insert(0);
        *count += 1;
        self.max_active_per_key.fetch_max(*count, Ordering::SeqCst);

        ActiveTransfer {
            sink: self,
            key: key.to_string(),
        }
    }

    fn cancel(&self) -> UploadError {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        UploadError::Cancelled
    }
}

#[async_trait]
impl ObjectSink for MemorySink {
    async fn put_object(
        &self,
        key: &str,
        mut body: File,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _transfer = self.begin(key);

        let mut contents = Vec::new();
        let mut chunk = vec![0u8; self.chunk_size];

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancel());
            }

            let read = body.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            contents.extend_from_slice(&chunk[..read]);

            if let Some(delay) = self.chunk_delay {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = cancel.cancelled() => return Err(self.cancel()),
                }
            }
        }

        lock(&self.objects).insert(key.to_string(), contents);
        Ok(())
    }
}

struct ActiveTransfer<'a> {
    sink: &'a MemorySink,
    key: String,
}

impl Drop for ActiveTransfer<'_> {
    fn drop(&mut self) {
        let mut active = lock(&self.sink.active);
        if let Some(count) = active.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                active.remove(&self.key);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
