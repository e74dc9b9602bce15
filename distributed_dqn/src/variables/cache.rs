//! Staleness-bounded parameter cache.
//!
//! Many actors share one cache so the learner only serves a handful of
//! readers. The cache refreshes from its source at most every
//! `refresh_interval`; if its snapshot grows older than `stale_after` it
//! refuses to serve it and retries with exponential backoff instead. The
//! lock is released while backing off, and a retry skips its own fetch when
//! another reader refreshed the snapshot in the meantime.
//!
//! ```text
//!   age:  0 ────────── refresh_interval ────────── stale_after ──────►
//!         serve cached    try refresh, serve       refetch until fresh,
//!                         cached on failure        never serve
//! ```

use super::source::{SharedVariableSource, VariableError, VariableSource};
use crate::core::{SharedClock, Snapshot};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Cache timing configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    /// Minimum time between refresh attempts.
    pub refresh_interval: Duration,
    /// Snapshots older than this are never served.
    pub stale_after: Duration,
    /// First retry delay while stale.
    pub initial_backoff: Duration,
    /// Retry delay cap.
    pub max_backoff: Duration,
    /// Give up with `Stale` after this many retries (None = retry forever).
    pub max_retries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_millis(2000),
            stale_after: Duration::from_millis(4000),
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
            max_retries: None,
        }
    }
}

impl CacheConfig {
    pub fn new(refresh_interval: Duration, stale_after: Duration) -> Self {
        Self {
            refresh_interval,
            stale_after,
            ..Default::default()
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.stale_after < self.refresh_interval {
            return Err(format!(
                "stale_after ({:?}) must be >= refresh_interval ({:?})",
                self.stale_after, self.refresh_interval
            ));
        }
        if self.initial_backoff.is_zero() || self.max_backoff < self.initial_backoff {
            return Err("backoff must be positive and max_backoff >= initial_backoff".to_string());
        }
        Ok(())
    }
}

struct CacheState<P> {
    snapshot: Option<Snapshot<P>>,
    last_refresh: Option<Instant>,
}

/// Parameter cache in front of a slower source.
pub struct VariableCache<P> {
    name: String,
    source: SharedVariableSource<P>,
    clock: SharedClock,
    config: CacheConfig,
    state: Mutex<CacheState<P>>,
    /// Successful fetches from the source
    refreshes: AtomicUsize,
    /// Failed fetches from the source
    failures: AtomicUsize,
}

impl<P> VariableCache<P> {
    /// Create a cache over `source`.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn new(
        name: impl Into<String>,
        source: SharedVariableSource<P>,
        clock: SharedClock,
        config: CacheConfig,
    ) -> Self {
        if let Err(e) = config.validate() {
            panic!("Invalid CacheConfig: {}", e);
        }
        Self {
            name: name.into(),
            source,
            clock,
            config,
            state: Mutex::new(CacheState {
                snapshot: None,
                last_refresh: None,
            }),
            refreshes: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Debug statistics: (refreshes, failures)
    pub fn stats(&self) -> (usize, usize) {
        (
            self.refreshes.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
        )
    }

    /// Pull from the source into `state`. Only `Closed` is reported.
    fn refresh(&self, state: &mut CacheState<P>) -> Result<(), VariableError> {
        match self.source.get_variables() {
            Ok(snapshot) => {
                if let Some(old) = &state.snapshot {
                    log::trace!(
                        "[VariableCache:{}] v{} -> v{} ({} behind)",
                        self.name,
                        old.version(),
                        snapshot.version(),
                        old.lag(snapshot.version())
                    );
                }
                state.snapshot = Some(snapshot);
                state.last_refresh = Some(self.clock.now());
                self.refreshes.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(VariableError::Closed) => Err(VariableError::Closed),
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                log::debug!("[VariableCache:{}] refresh failed: {}", self.name, e);
                Ok(())
            }
        }
    }

    /// Age of the cached snapshot, if there is one.
    fn age(&self, state: &CacheState<P>) -> Option<Duration> {
        state
            .last_refresh
            .map(|t| self.clock.now().saturating_duration_since(t))
    }
}

impl<P: Send + Sync> VariableSource<P> for VariableCache<P> {
    fn get_variables(&self) -> Result<Snapshot<P>, VariableError> {
        let mut state = self.state.lock();

        let due = self
            .age(&state)
            .map_or(true, |age| age > self.config.refresh_interval);
        if due {
            self.refresh(&mut state)?;
        }

        let mut backoff = self.config.initial_backoff;
        let mut retries = 0;
        loop {
            let age = self.age(&state);
            if let (Some(snapshot), Some(age)) = (&state.snapshot, age) {
                if age <= self.config.stale_after {
                    return Ok(snapshot.clone());
                }
            }

            if let Some(max) = self.config.max_retries {
                if retries >= max {
                    log::warn!("[VariableCache:{}] giving up after {} retries", self.name, retries);
                    return Err(VariableError::Stale {
                        age: age.unwrap_or(Duration::MAX),
                    });
                }
            }

            // Other readers may use the cache while this one backs off.
            let seen = state.last_refresh;
            MutexGuard::unlocked(&mut state, || self.clock.sleep(backoff));
            backoff = (backoff * 2).min(self.config.max_backoff);
            retries += 1;
            if state.last_refresh == seen {
                self.refresh(&mut state)?;
            }
        }
    }
}
