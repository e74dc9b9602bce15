//! Actor-side view of the learner's parameters.
//!
//! `update()` is called once per environment step. Every `update_period`
//! calls it asks a background thread to fetch a new snapshot and returns
//! immediately; the result is picked up by a later call. A failed fetch keeps
//! the parameters the actor already has.

use super::source::{SharedVariableSource, VariableError};
use crate::core::Snapshot;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use std::thread::JoinHandle;

/// Periodically refreshed local copy of remote parameters.
pub struct VariableClient<P> {
    source: SharedVariableSource<P>,
    update_period: usize,
    calls_since_request: usize,
    current: Option<Snapshot<P>>,
    in_flight: bool,
    request_tx: Option<Sender<()>>,
    result_rx: Receiver<Result<Snapshot<P>, VariableError>>,
    thread: Option<JoinHandle<()>>,
    /// Completed background fetches that failed
    failed_fetches: usize,
}

impl<P: Send + Sync + 'static> VariableClient<P> {
    /// Create a client with a background fetch thread named `name`.
    ///
    /// An `update_period` of 0 is treated as 1.
    pub fn new(name: &str, source: SharedVariableSource<P>, update_period: usize) -> Self {
        let (request_tx, request_rx) = bounded::<()>(1);
        let (result_tx, result_rx) = bounded(1);

        let thread_source = source.clone();
        let thread = std::thread::Builder::new()
            .name(format!("{}-variables", name))
            .spawn(move || {
                while request_rx.recv().is_ok() {
                    if result_tx.send(thread_source.get_variables()).is_err() {
                        break;
                    }
                }
            })
            .expect("Failed to spawn variable client thread");

        Self {
            source,
            update_period: update_period.max(1),
            calls_since_request: 0,
            current: None,
            in_flight: false,
            request_tx: Some(request_tx),
            result_rx,
            thread: Some(thread),
            failed_fetches: 0,
        }
    }
}

impl<P> VariableClient<P> {
    /// Fetch synchronously on the calling thread.
    pub fn update_and_wait(&mut self) -> Result<(), VariableError> {
        let snapshot = self.source.get_variables()?;
        self.apply(snapshot);
        Ok(())
    }

    /// Non-blocking periodic update.
    ///
    /// Returns `Err(Closed)` once the source reports it was shut down; every
    /// other failure is absorbed.
    pub fn update(&mut self) -> Result<(), VariableError> {
        self.poll()?;

        self.calls_since_request += 1;
        if self.calls_since_request >= self.update_period && !self.in_flight {
            self.calls_since_request = 0;
            if let Some(tx) = &self.request_tx {
                match tx.try_send(()) {
                    Ok(()) => self.in_flight = true,
                    Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => return Err(VariableError::Closed),
                }
            }
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<(), VariableError> {
        match self.result_rx.try_recv() {
            Ok(Ok(snapshot)) => {
                self.in_flight = false;
                self.apply(snapshot);
                Ok(())
            }
            Ok(Err(VariableError::Closed)) => {
                self.in_flight = false;
                Err(VariableError::Closed)
            }
            Ok(Err(e)) => {
                self.in_flight = false;
                self.failed_fetches += 1;
                log::debug!("[VariableClient] fetch failed, keeping v{}: {}", self.version(), e);
                Ok(())
            }
            Err(TryRecvError::Empty) => Ok(()),
            Err(TryRecvError::Disconnected) => Err(VariableError::Closed),
        }
    }

    fn apply(&mut self, snapshot: Snapshot<P>) {
        // Never step back to an older version.
        if self
            .current
            .as_ref()
            .map_or(true, |c| snapshot.version() >= c.version())
        {
            self.current = Some(snapshot);
        }
    }

    /// Parameters currently held, if any fetch has succeeded.
    pub fn params(&self) -> Option<&P> {
        self.current.as_ref().map(|s| s.params())
    }

    /// Snapshot currently held.
    pub fn snapshot(&self) -> Option<&Snapshot<P>> {
        self.current.as_ref()
    }

    /// Version currently held (0 before the first fetch).
    pub fn version(&self) -> u64 {
        self.current.as_ref().map_or(0, |s| s.version())
    }

    /// Whether a background fetch has been requested but not yet applied.
    pub fn is_fetching(&self) -> bool {
        self.in_flight
    }

    /// Completed background fetches that failed.
    pub fn failed_fetches(&self) -> usize {
        self.failed_fetches
    }
}

impl<P> Drop for VariableClient<P> {
    fn drop(&mut self) {
        // Closing the request channel ends the fetch loop.
        self.request_tx.take();
        while self.result_rx.try_recv().is_ok() {}
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
