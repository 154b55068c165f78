//! Temp-WARC garbage collection background task
//!
//! Runs in a background thread and periodically asks the data store to
//! reclaim temp WARCs whose artifacts have all left the temp lifecycle
//! (copied, expired or deleted). Shutdown is signaled via an atomic flag;
//! the sleep is sliced so shutdown is observed promptly.

use crate::data_store::WarcDataStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::warn;

/// Handle to the GC thread.
pub struct TempWarcGc {
    shutdown: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TempWarcGc {
    /// Spawn the GC loop over `store` with the given period.
    pub fn start(store: Arc<WarcDataStore>, interval: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("warcrepo-gc".to_string())
            .spawn(move || {
                while !thread_shutdown.load(Ordering::Relaxed) {
                    // Sleep first; slice it so shutdown is seen quickly
                    let slice = Duration::from_millis(100).min(interval);
                    let mut elapsed = Duration::ZERO;
                    while elapsed < interval {
                        if thread_shutdown.load(Ordering::Relaxed) {
                            return;
                        }
                        thread::sleep(slice);
                        elapsed += slice;
                    }

                    if let Err(e) = store.garbage_collect_temp_warcs() {
                        warn!(target: "warcrepo::gc", error = %e, "temp WARC GC pass failed");
                    }
                }
            })
            .expect("failed to spawn GC thread");

        Self {
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Signal shutdown and join the thread. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    /// Whether shutdown has been signaled.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

impl Drop for TempWarcGc {
    fn drop(&mut self) {
        self.shutdown();
    }
}
