//! Bounded, prioritized, rate-limited replay table.
//!
//! The table is the single serialization point between many concurrent
//! writers (actors) and the reader (learner). All state lives behind one
//! mutex; callers the rate limiter turns away park on a condvar and are woken
//! when the other side makes progress.
//!
//! # Storage
//!
//! Items are keyed by a monotonically increasing insertion key. With FIFO
//! removal and a fixed capacity, key `k` always lives in slot
//! `k % max_size`, so inserting into a full table overwrites exactly the
//! oldest item.
//!
//! ```text
//! keys:    [ 7 ][ 8 ][ 9 ][ 4 ][ 5 ][ 6 ]     max_size = 6, next_key = 10
//!                           ^ oldest = next_key - size
//! ```
//!
//! # Sampling
//!
//! Draws are with replacement, probability proportional to
//! `priority^priority_exponent`. A zero priority has zero weight, so it is
//! never drawn unless every stored priority is zero, in which case the table
//! falls back to uniform sampling. Priorities whose weight could overflow the
//! sum tree total are rejected as invalid.

use super::rate_limiter::{LimiterState, RateLimiter};
use super::sum_tree::SumTree;
use parking_lot::{Condvar, Mutex, MutexGuard};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Error type for replay operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayError {
    /// The table was closed; no further inserts or samples will succeed.
    Closed,
    /// The rate limiter did not admit the operation before the deadline.
    Timeout,
    /// Priority was negative or not finite.
    InvalidPriority(f64),
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayError::Closed => write!(f, "replay table closed"),
            ReplayError::Timeout => write!(f, "rate limiter timeout"),
            ReplayError::InvalidPriority(p) => write!(f, "invalid priority: {}", p),
        }
    }
}

impl std::error::Error for ReplayError {}

/// Table configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Table name (used in logs)
    pub name: String,
    /// Maximum number of stored items
    pub max_size: usize,
    /// Exponent applied to priorities before sampling
    pub priority_exponent: f64,
    /// Insert/sample admission policy
    pub rate_limiter: RateLimiter,
    /// Seed for the sampling RNG (None = from entropy)
    pub seed: Option<u64>,
}

impl TableConfig {
    /// Create a config with the given capacity and limiter.
    pub fn new(max_size: usize, rate_limiter: RateLimiter) -> Self {
        Self {
            name: "priority_table".to_string(),
            max_size,
            priority_exponent: 0.6,
            rate_limiter,
            seed: None,
        }
    }

    /// Set the table name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the priority exponent.
    pub fn with_priority_exponent(mut self, exponent: f64) -> Self {
        self.priority_exponent = exponent;
        self
    }

    /// Seed the sampling RNG.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_size == 0 {
            return Err("max_size must be > 0".to_string());
        }
        if !self.priority_exponent.is_finite() || self.priority_exponent < 0.0 {
            return Err(format!(
                "priority_exponent must be finite and >= 0, got {}",
                self.priority_exponent
            ));
        }
        if self.rate_limiter.min_size_to_sample() > self.max_size {
            return Err(format!(
                "min_size_to_sample ({}) exceeds max_size ({})",
                self.rate_limiter.min_size_to_sample(),
                self.max_size
            ));
        }
        self.rate_limiter.validate()
    }
}

/// One sampled item.
#[derive(Debug)]
pub struct SampledItem<T> {
    /// Insertion key (used to write priorities back)
    pub key: u64,
    /// The stored item
    pub item: Arc<T>,
    /// Priority at sampling time
    pub priority: f64,
    /// Probability this item had of being drawn
    pub probability: f64,
    /// Table size at sampling time
    pub table_size: usize,
}

impl<T> Clone for SampledItem<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            item: Arc::clone(&self.item),
            priority: self.priority,
            probability: self.probability,
            table_size: self.table_size,
        }
    }
}

/// Point-in-time table statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub name: String,
    pub max_size: usize,
    pub size: usize,
    pub inserts: u64,
    pub samples: u64,
    pub evictions: u64,
    pub rate_limiter: RateLimiter,
}

struct Slot<T> {
    key: u64,
    item: Arc<T>,
    priority: f64,
}

struct TableState<T> {
    slots: Vec<Option<Slot<T>>>,
    tree: SumTree,
    next_key: u64,
    size: usize,
    inserts: u64,
    samples: u64,
    evictions: u64,
    closed: bool,
    rng: StdRng,
}

impl<T> TableState<T> {
    fn limiter_state(&self) -> LimiterState {
        LimiterState {
            inserts: self.inserts,
            samples: self.samples,
            size: self.size,
        }
    }

    fn oldest_key(&self) -> u64 {
        self.next_key - self.size as u64
    }

    fn contains(&self, key: u64) -> bool {
        key >= self.oldest_key() && key < self.next_key
    }

    fn push(&mut self, item: Arc<T>, priority: f64, exponent: f64) -> u64 {
        let capacity = self.slots.len();
        let key = self.next_key;
        let idx = (key % capacity as u64) as usize;

        if self.size == capacity {
            // Slot `idx` holds the oldest key; FIFO eviction is implicit.
            self.evictions += 1;
        } else {
            self.size += 1;
        }

        self.slots[idx] = Some(Slot { key, item, priority });
        self.tree.set(idx, sampling_weight(priority, exponent));
        self.next_key += 1;
        self.inserts += 1;
        key
    }

    fn draw(&mut self) -> SampledItem<T> {
        let capacity = self.slots.len();
        let total = self.tree.total();

        let (idx, probability) = if total > 0.0 {
            let value = self.rng.gen::<f64>() * total;
            let mut idx = self.tree.find(value);
            if self.tree.get(idx) <= 0.0 {
                // Rounding at the upper edge can land on an empty leaf.
                idx = self.tree.argmax().unwrap_or(idx);
            }
            (idx, self.tree.get(idx) / total)
        } else {
            let offset = self.rng.gen_range(0..self.size) as u64;
            let key = self.oldest_key() + offset;
            ((key % capacity as u64) as usize, 1.0 / self.size as f64)
        };

        self.samples += 1;

        match &self.slots[idx] {
            Some(slot) => SampledItem {
                key: slot.key,
                item: Arc::clone(&slot.item),
                priority: slot.priority,
                probability,
                table_size: self.size,
            },
            None => unreachable!("sampled an empty slot with size {}", self.size),
        }
    }
}

/// Weight of an item in the sum tree.
fn sampling_weight(priority: f64, exponent: f64) -> f64 {
    if priority <= 0.0 {
        0.0
    } else {
        priority.powf(exponent)
    }
}

/// Priorities must be finite, non-negative, and small enough that their
/// weight keeps the sum tree total finite.
fn check_priority(priority: f64, exponent: f64, max_weight: f64) -> Result<(), ReplayError> {
    if priority.is_finite()
        && priority >= 0.0
        && sampling_weight(priority, exponent) <= max_weight
    {
        Ok(())
    } else {
        Err(ReplayError::InvalidPriority(priority))
    }
}

/// Prioritized replay table with FIFO eviction and rate limiting.
pub struct ReplayTable<T> {
    config: TableConfig,
    state: Mutex<TableState<T>>,
    /// Woken after samples (may unblock inserters)
    insert_cv: Condvar,
    /// Woken after inserts (may unblock samplers)
    sample_cv: Condvar,
}

impl<T> ReplayTable<T> {
    /// Create a new table.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn new(config: TableConfig) -> Self {
        if let Err(e) = config.validate() {
            panic!("Invalid TableConfig: {}", e);
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let state = TableState {
            slots: (0..config.max_size).map(|_| None).collect(),
            tree: SumTree::new(config.max_size),
            next_key: 0,
            size: 0,
            inserts: 0,
            samples: 0,
            evictions: 0,
            closed: false,
            rng,
        };

        Self {
            config,
            state: Mutex::new(state),
            insert_cv: Condvar::new(),
            sample_cv: Condvar::new(),
        }
    }

    /// Table configuration.
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    fn check_priority(&self, priority: f64) -> Result<(), ReplayError> {
        check_priority(
            priority,
            self.config.priority_exponent,
            SumTree::weight_limit(self.config.max_size),
        )
    }

    /// Insert an item, blocking while the rate limiter disallows it.
    ///
    /// Returns the item's key.
    pub fn insert(&self, item: T, priority: f64) -> Result<u64, ReplayError> {
        self.insert_shared(Arc::new(item), priority, None)
    }

    /// Insert a shared item, giving up after `timeout`.
    ///
    /// On `Timeout` the caller still owns its `Arc` and may retry.
    pub fn insert_timeout(
        &self,
        item: Arc<T>,
        priority: f64,
        timeout: Duration,
    ) -> Result<u64, ReplayError> {
        self.insert_shared(item, priority, Some(Instant::now() + timeout))
    }

    /// Insert without blocking.
    pub fn try_insert(&self, item: T, priority: f64) -> Result<u64, ReplayError> {
        self.insert_shared(Arc::new(item), priority, Some(Instant::now()))
    }

    fn insert_shared(
        &self,
        item: Arc<T>,
        priority: f64,
        deadline: Option<Instant>,
    ) -> Result<u64, ReplayError> {
        self.check_priority(priority)?;

        let mut state = self.state.lock();
        let limiter = self.config.rate_limiter;
        self.wait_for(&self.insert_cv, &mut state, deadline, |s| {
            limiter.can_insert(&s.limiter_state())
        })?;

        let key = state.push(item, priority, self.config.priority_exponent);
        drop(state);

        self.sample_cv.notify_all();
        Ok(key)
    }

    /// Draw `batch_size` items, blocking until the rate limiter admits each.
    pub fn sample(&self, batch_size: usize) -> Result<Vec<SampledItem<T>>, ReplayError> {
        self.sample_until(batch_size, None)
    }

    /// Draw `batch_size` items, giving up after `timeout`.
    ///
    /// Items drawn before the deadline still count as sampled for the rate
    /// limiter; a timed-out batch is discarded.
    pub fn sample_timeout(
        &self,
        batch_size: usize,
        timeout: Duration,
    ) -> Result<Vec<SampledItem<T>>, ReplayError> {
        self.sample_until(batch_size, Some(Instant::now() + timeout))
    }

    /// Draw without blocking.
    pub fn try_sample(&self, batch_size: usize) -> Result<Vec<SampledItem<T>>, ReplayError> {
        self.sample_until(batch_size, Some(Instant::now()))
    }

    fn sample_until(
        &self,
        batch_size: usize,
        deadline: Option<Instant>,
    ) -> Result<Vec<SampledItem<T>>, ReplayError> {
        let limiter = self.config.rate_limiter;
        let mut batch = Vec::with_capacity(batch_size);
        let mut state = self.state.lock();

        for _ in 0..batch_size {
            let admitted = self.wait_for(&self.sample_cv, &mut state, deadline, |s| {
                limiter.can_sample(&s.limiter_state())
            });
            if let Err(e) = admitted {
                drop(state);
                if !batch.is_empty() {
                    self.insert_cv.notify_all();
                }
                return Err(e);
            }

            batch.push(state.draw());
            // Each sample may unblock an inserter; wake them without
            // releasing the lock, they will run once we are done.
            self.insert_cv.notify_all();
        }

        Ok(batch)
    }

    /// Park on `cv` until `ready` holds, the table closes, or the deadline passes.
    fn wait_for<F>(
        &self,
        cv: &Condvar,
        state: &mut MutexGuard<'_, TableState<T>>,
        deadline: Option<Instant>,
        ready: F,
    ) -> Result<(), ReplayError>
    where
        F: Fn(&TableState<T>) -> bool,
    {
        loop {
            if state.closed {
                return Err(ReplayError::Closed);
            }
            if ready(state) {
                return Ok(());
            }
            match deadline {
                None => cv.wait(state),
                Some(deadline) => {
                    if Instant::now() >= deadline || cv.wait_until(state, deadline).timed_out() {
                        if state.closed {
                            return Err(ReplayError::Closed);
                        }
                        return if ready(state) {
                            Ok(())
                        } else {
                            Err(ReplayError::Timeout)
                        };
                    }
                }
            }
        }
    }

    /// Write new priorities for previously sampled keys.
    ///
    /// Keys evicted since sampling are skipped. Returns how many items were
    /// updated. No priority is applied if any of them is invalid.
    pub fn update_priorities(&self, keys: &[u64], priorities: &[f64]) -> Result<usize, ReplayError> {
        for &p in priorities {
            self.check_priority(p)?;
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let capacity = state.slots.len() as u64;
        let mut updated = 0;

        for (&key, &priority) in keys.iter().zip(priorities.iter()) {
            if !state.contains(key) {
                continue;
            }
            let idx = (key % capacity) as usize;
            if let Some(slot) = state.slots[idx].as_mut() {
                slot.priority = priority;
                state.tree.set(idx, sampling_weight(priority, self.config.priority_exponent));
                updated += 1;
            }
        }

        Ok(updated)
    }

    /// Priority currently stored for `key`, if it is still present.
    pub fn priority(&self, key: u64) -> Option<f64> {
        let state = self.state.lock();
        if !state.contains(key) {
            return None;
        }
        let idx = (key % state.slots.len() as u64) as usize;
        state.slots[idx].as_ref().map(|s| s.priority)
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.state.lock().size
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Table statistics.
    pub fn info(&self) -> TableInfo {
        let state = self.state.lock();
        TableInfo {
            name: self.config.name.clone(),
            max_size: self.config.max_size,
            size: state.size,
            inserts: state.inserts,
            samples: state.samples,
            evictions: state.evictions,
            rate_limiter: self.config.rate_limiter,
        }
    }

    /// Close the table and wake every waiter with `ReplayError::Closed`.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            log::info!("[ReplayTable:{}] closed after {} inserts", self.config.name, state.inserts);
        }
        drop(state);
        self.insert_cv.notify_all();
        self.sample_cv.notify_all();
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Thread-safe shared replay table.
pub type SharedReplayTable<T> = Arc<ReplayTable<T>>;

/// Create a new shared replay table.
pub fn replay_table<T>(config: TableConfig) -> SharedReplayTable<T> {
    Arc::new(ReplayTable::new(config))
}
