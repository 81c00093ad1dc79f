#![allow(dead_code)]

use s3u_watcher::ChangeEvent;
use std::sync::Once;
use tokio::sync::mpsc;

static INIT: Once = Once::new();

pub fn init_tracing() {
    // Initialize logging once
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Drain every event currently queued without waiting
pub fn drain(events: &mut mpsc::Receiver<ChangeEvent>) -> Vec<ChangeEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
