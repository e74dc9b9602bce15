//! Prefetching batch reader on top of a replay table.
//!
//! A background thread keeps up to `prefetch_size` batches ready so the
//! learner does not pay the rate-limiter wait on its critical path.

use super::table::{ReplayError, SampledItem, SharedReplayTable};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How long the prefetch thread waits on the table before rechecking `stop`.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Dataset configuration.
#[derive(Debug, Clone, Copy)]
pub struct DatasetConfig {
    /// Items per batch
    pub batch_size: usize,
    /// Batches buffered ahead of the consumer
    pub prefetch_size: usize,
}

impl DatasetConfig {
    pub fn new(batch_size: usize, prefetch_size: usize) -> Self {
        Self {
            batch_size,
            prefetch_size,
        }
    }
}

/// Stream of sampled batches fed by a prefetch thread.
pub struct ReplayDataset<T> {
    batch_rx: Receiver<Vec<SampledItem<T>>>,
    table: SharedReplayTable<T>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl<T: Send + Sync + 'static> ReplayDataset<T> {
    /// Start prefetching from `table`.
    pub fn new(table: SharedReplayTable<T>, config: DatasetConfig) -> Self {
        assert!(config.batch_size > 0, "batch_size must be > 0");

        let (batch_tx, batch_rx) = bounded(config.prefetch_size.max(1));
        let stop = Arc::new(AtomicBool::new(false));

        let thread_table = Arc::clone(&table);
        let thread_stop = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name(format!("{}-prefetch", table.config().name))
            .spawn(move || {
                prefetch_loop(thread_table, batch_tx, config.batch_size, thread_stop);
            })
            .expect("Failed to spawn prefetch thread");

        Self {
            batch_rx,
            table,
            stop,
            thread: Some(thread),
        }
    }

    /// Wait up to `timeout` for the next batch.
    ///
    /// Returns `Closed` once the table is closed and every prefetched batch
    /// has been consumed.
    pub fn next_batch(&self, timeout: Duration) -> Result<Vec<SampledItem<T>>, ReplayError> {
        match self.batch_rx.recv_timeout(timeout) {
            Ok(batch) => Ok(batch),
            Err(RecvTimeoutError::Timeout) => Err(ReplayError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(ReplayError::Closed),
        }
    }

    /// Table the dataset reads from.
    pub fn table(&self) -> &SharedReplayTable<T> {
        &self.table
    }

    /// Batches currently buffered.
    pub fn buffered(&self) -> usize {
        self.batch_rx.len()
    }
}

impl<T> ReplayDataset<T> {
    /// Stop the prefetch thread and wait for it.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Drain so a blocked `send` can observe the stop flag.
        while self.batch_rx.try_recv().is_ok() {}
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl<T> Drop for ReplayDataset<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn prefetch_loop<T>(
    table: SharedReplayTable<T>,
    batch_tx: Sender<Vec<SampledItem<T>>>,
    batch_size: usize,
    stop: Arc<AtomicBool>,
) {
    let mut pending: Vec<SampledItem<T>> = Vec::with_capacity(batch_size);

    while !stop.load(Ordering::Relaxed) {
        // Draw one item at a time so a timeout never discards admitted samples.
        match table.sample_timeout(1, POLL_INTERVAL) {
            Ok(mut items) => pending.append(&mut items),
            Err(ReplayError::Timeout) => continue,
            Err(ReplayError::Closed) => break,
            Err(e) => {
                log::error!("[ReplayDataset] sampling failed: {}", e);
                break;
            }
        }

        if pending.len() < batch_size {
            continue;
        }

        let mut batch = std::mem::replace(&mut pending, Vec::with_capacity(batch_size));
        loop {
            match batch_tx.send_timeout(batch, POLL_INTERVAL) {
                Ok(()) => break,
                Err(crossbeam_channel::SendTimeoutError::Timeout(b)) => {
                    if stop.load(Ordering::Relaxed) {
                        return;
                    }
                    batch = b;
                }
                Err(crossbeam_channel::SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }

    log::debug!("[ReplayDataset] prefetch thread exiting");
}
