//! Counter service: one thread owns every count, clients talk to it over a
//! channel.
//!
//! # Protocol
//!
//! ```text
//!   CounterClient ──Increment{ns, deltas, reply}──► service thread
//!                 ◄──────────── Counts ───────────── (namespace totals)
//! ```
//!
//! The service persists its whole state through a [`CheckpointingRunner`]
//! every `time_delta` and once more on `Stop`, and restores the newest
//! checkpoint when it starts.

use crate::checkpoint::{Checkpointer, CheckpointerConfig, CheckpointingRunner};
use crate::core::SharedClock;
use crate::messages::{CounterMsg, CounterSnapshot, Counts, FinishReason};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::thread::JoinHandle;
use std::time::Duration;

/// Longest the service sleeps before rechecking its save interval.
const MAX_POLL: Duration = Duration::from_secs(1);

/// Error returned by counter clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterError {
    /// The service thread has exited.
    Disconnected,
}

impl fmt::Display for CounterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterError::Disconnected => write!(f, "counter service disconnected"),
        }
    }
}

impl std::error::Error for CounterError {}

/// Counter service configuration.
#[derive(Debug, Clone, Default)]
pub struct CounterConfig {
    /// Where and how often to persist. `None` keeps counts in memory only.
    pub checkpoint: Option<CheckpointerConfig>,
}

impl CounterConfig {
    /// In-memory counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist through `checkpoint`.
    pub fn with_checkpoint(mut self, checkpoint: CheckpointerConfig) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }
}

/// Cloneable client of the counter service.
#[derive(Debug, Clone)]
pub struct CounterClient {
    tx: Sender<CounterMsg>,
}

impl CounterClient {
    /// Add `deltas` to `namespace`; returns the namespace totals afterwards.
    pub fn increment(&self, namespace: &str, deltas: &[(&str, u64)]) -> Result<Counts, CounterError> {
        let (reply, rx) = bounded(1);
        let msg = CounterMsg::Increment {
            namespace: namespace.to_string(),
            deltas: deltas.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            reply,
        };
        self.request(msg, rx)
    }

    /// Totals of `namespace` (empty if nothing was counted yet).
    pub fn get_counts(&self, namespace: &str) -> Result<Counts, CounterError> {
        let (reply, rx) = bounded(1);
        let msg = CounterMsg::Get {
            namespace: namespace.to_string(),
            reply,
        };
        self.request(msg, rx)
    }

    /// Every namespace's totals.
    pub fn snapshot(&self) -> Result<CounterSnapshot, CounterError> {
        let (reply, rx) = bounded(1);
        self.request(CounterMsg::Snapshot { reply }, rx)
    }

    /// Client bound to one namespace.
    pub fn scoped(&self, namespace: impl Into<String>) -> ScopedCounter {
        ScopedCounter {
            client: self.clone(),
            namespace: namespace.into(),
        }
    }

    fn request<R>(&self, msg: CounterMsg, rx: Receiver<R>) -> Result<R, CounterError> {
        self.tx.send(msg).map_err(|_| CounterError::Disconnected)?;
        rx.recv().map_err(|_| CounterError::Disconnected)
    }
}

/// Counter client bound to a single namespace.
#[derive(Debug, Clone)]
pub struct ScopedCounter {
    client: CounterClient,
    namespace: String,
}

impl ScopedCounter {
    /// Namespace this counter writes to.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Add deltas; returns the namespace totals.
    pub fn increment(&self, deltas: &[(&str, u64)]) -> Result<Counts, CounterError> {
        self.client.increment(&self.namespace, deltas)
    }

    /// Current namespace totals.
    pub fn get_counts(&self) -> Result<Counts, CounterError> {
        self.client.get_counts(&self.namespace)
    }

    /// One field of the namespace, 0 if unset.
    pub fn get(&self, field: &str) -> Result<u64, CounterError> {
        Ok(self.get_counts()?.get(field).copied().unwrap_or(0))
    }
}

/// Handle for the spawned counter service.
pub struct CounterHandle {
    /// Thread handle
    pub thread: JoinHandle<FinishReason>,
    client: CounterClient,
}

impl CounterHandle {
    /// A new client of this service.
    pub fn client(&self) -> CounterClient {
        self.client.clone()
    }

    /// Ask the service to persist and exit.
    pub fn stop(&self) {
        let _ = self.client.tx.send(CounterMsg::Stop);
    }

    /// Wait for the service thread to finish.
    pub fn join(self) -> FinishReason {
        FinishReason::from_join(self.thread.join())
    }
}

/// Spawn the counter service thread.
pub fn spawn_counter(config: CounterConfig, clock: SharedClock) -> CounterHandle {
    let (tx, rx) = unbounded();

    let thread = std::thread::Builder::new()
        .name("counter".to_string())
        .spawn(move || run_counter(config, clock, rx))
        .expect("Failed to spawn counter thread");

    CounterHandle {
        thread,
        client: CounterClient { tx },
    }
}

fn run_counter(config: CounterConfig, clock: SharedClock, rx: Receiver<CounterMsg>) -> FinishReason {
    let mut runner = match config.checkpoint.map(Checkpointer::new).transpose() {
        Ok(checkpointer) => checkpointer.map(|c| CheckpointingRunner::new(c, clock)),
        Err(e) => return FinishReason::Failed(format!("counter checkpoint dir: {}", e)),
    };

    let mut state: CounterSnapshot = runner
        .as_ref()
        .and_then(|r| r.restore())
        .unwrap_or_default();

    let poll = runner
        .as_ref()
        .map(|r| r.checkpointer().config().time_delta.min(MAX_POLL))
        .unwrap_or(MAX_POLL);

    log::info!("[Counter] started with {} namespaces", state.len());

    loop {
        match rx.recv_timeout(poll) {
            Ok(CounterMsg::Increment {
                namespace,
                deltas,
                reply,
            }) => {
                let counts = state.entry(namespace).or_default();
                for (field, delta) in deltas {
                    let value = counts.entry(field).or_insert(0);
                    *value = value.saturating_add(delta);
                }
                let _ = reply.send(counts.clone());
            }
            Ok(CounterMsg::Get { namespace, reply }) => {
                let _ = reply.send(state.get(&namespace).cloned().unwrap_or_default());
            }
            Ok(CounterMsg::Snapshot { reply }) => {
                let _ = reply.send(state.clone());
            }
            Ok(CounterMsg::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        if let Some(runner) = runner.as_mut() {
            if let Err(e) = runner.maybe_save(&state) {
                log::warn!("[Counter] checkpoint failed: {}", e);
            }
        }
    }

    if let Some(runner) = runner.as_mut() {
        if let Err(e) = runner.save(&state) {
            log::error!("[Counter] final checkpoint failed: {}", e);
            return FinishReason::Failed(e.to_string());
        }
    }

    log::info!("[Counter] stopped");
    FinishReason::Stopped
}
