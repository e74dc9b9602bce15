//! Learner-side parameter store.
//!
//! The learner keeps mutating its live parameters; `publish` copies them into
//! a fresh `Arc` under a new version, so readers only ever see complete,
//! immutable snapshots.
//!
//! ```text
//! Learner: publish(params.clone())  ──►  [ Snapshot v7 ]  ◄── get_variables()
//!                                               │               (Arc clone)
//!          publish(params.clone())  ──►  [ Snapshot v8 ]     v7 freed once
//!                                                            the last reader drops it
//! ```

use super::source::{VariableError, VariableSource};
use crate::core::{Snapshot, VersionCounter};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Versioned single-value parameter store.
pub struct VariableSlot<P> {
    current: RwLock<Option<Snapshot<P>>>,
    version: VersionCounter,
    closed: AtomicBool,
    /// Counter for total publishes
    published_count: AtomicUsize,
    /// Counter for snapshots handed out
    fetch_count: AtomicUsize,
}

impl<P> VariableSlot<P> {
    /// Create an empty slot. Readers get `Unavailable` until the first publish.
    pub fn new() -> Self {
        Self::resume_at(0)
    }

    /// Create an empty slot whose next publish gets `version + 1`.
    pub fn resume_at(version: u64) -> Self {
        Self {
            current: RwLock::new(None),
            version: VersionCounter::starting_at(version),
            closed: AtomicBool::new(false),
            published_count: AtomicUsize::new(0),
            fetch_count: AtomicUsize::new(0),
        }
    }

    /// Create a slot holding `params` as version 1.
    pub fn with_initial(params: P) -> Self {
        let slot = Self::new();
        slot.publish(params);
        slot
    }

    /// Publish a new snapshot; returns its version.
    pub fn publish(&self, params: P) -> u64 {
        let mut current = self.current.write();
        let version = self.version.increment();
        *current = Some(Snapshot::new(params, version));
        self.published_count.fetch_add(1, Ordering::Relaxed);
        version
    }

    /// Version of the latest snapshot (0 before the first publish).
    pub fn version(&self) -> u64 {
        self.version.current()
    }

    /// Latest snapshot without touching the closed flag or the stats.
    pub fn latest(&self) -> Option<Snapshot<P>> {
        self.current.read().clone()
    }

    /// Refuse all further reads with `Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Debug statistics: (published, fetched)
    pub fn stats(&self) -> (usize, usize) {
        (
            self.published_count.load(Ordering::Relaxed),
            self.fetch_count.load(Ordering::Relaxed),
        )
    }
}

impl<P> Default for VariableSlot<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Send + Sync> VariableSource<P> for VariableSlot<P> {
    fn get_variables(&self) -> Result<Snapshot<P>, VariableError> {
        if self.is_closed() {
            return Err(VariableError::Closed);
        }
        let snapshot = self.latest().ok_or(VariableError::Unavailable)?;
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        Ok(snapshot)
    }
}

/// Shared parameter slot.
pub type SharedVariableSlot<P> = Arc<VariableSlot<P>>;

/// Create a new shared parameter slot holding `params` as version 1.
pub fn variable_slot<P>(params: P) -> SharedVariableSlot<P> {
    Arc::new(VariableSlot::with_initial(params))
}
