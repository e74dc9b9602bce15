//! Parameter versioning.
//!
//! Every publish from the learner bumps a monotonically increasing version.
//! Actors and caches compare versions to tell how far behind they are.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic publish counter. Version 0 means nothing was published yet.
#[derive(Debug, Default)]
pub struct VersionCounter(AtomicU64);

impl VersionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume numbering after `version`.
    pub fn starting_at(version: u64) -> Self {
        Self(AtomicU64::new(version))
    }

    /// Claim the next version.
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last claimed version.
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Immutable, versioned copy of learner parameters.
///
/// Cloning a snapshot only bumps a reference count; the parameters themselves
/// are never mutated after publication.
#[derive(Debug)]
pub struct Snapshot<P> {
    params: Arc<P>,
    version: u64,
}

impl<P> Clone for Snapshot<P> {
    fn clone(&self) -> Self {
        Self {
            params: Arc::clone(&self.params),
            version: self.version,
        }
    }
}

impl<P> Snapshot<P> {
    pub fn new(params: P, version: u64) -> Self {
        Self {
            params: Arc::new(params),
            version,
        }
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    /// Version this snapshot was published under.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Versions published since this one, given the latest `version`.
    pub fn lag(&self, version: u64) -> u64 {
        version.saturating_sub(self.version)
    }
}
