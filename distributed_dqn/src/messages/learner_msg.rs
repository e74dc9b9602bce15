//! Messages for the learner thread.

use std::collections::BTreeMap;

/// Commands sent to the learner thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnerMsg {
    /// Stop after the current training step.
    Stop,
    /// Report statistics on the stats channel.
    RequestStats,
}

/// Statistics reported by the learner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearnerStats {
    /// Training steps completed (restored steps included).
    pub train_steps: u64,

    /// Hard online-to-target copies performed.
    pub target_updates: u64,

    /// Metrics returned by the most recent training step.
    pub last_metrics: BTreeMap<String, f64>,

    /// Training steps per second since start.
    pub steps_per_second: f64,

    /// Version of the most recently published parameters.
    pub params_version: u64,

    /// Replay items at the last step.
    pub replay_size: usize,

    /// Priority write-backs skipped because of a length mismatch.
    pub skipped_priority_updates: u64,
}

impl LearnerStats {
    /// Create new learner stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update with one training step's metrics.
    pub fn record_step(&mut self, metrics: &BTreeMap<String, f64>) {
        self.train_steps += 1;
        self.last_metrics.clone_from(metrics);
    }

    /// Update published parameter version.
    pub fn set_params_version(&mut self, version: u64) {
        self.params_version = version;
    }

    /// Update steps per second.
    pub fn set_steps_per_second(&mut self, sps: f64) {
        self.steps_per_second = sps;
    }
}

/// Calculate steps per second safely, handling near-zero elapsed times.
#[inline]
pub(crate) fn safe_steps_per_second(steps: u64, elapsed_secs: f64) -> f64 {
    const MIN_ELAPSED: f64 = 1e-6;
    const MAX_RATE: f64 = 1e9;

    if elapsed_secs < MIN_ELAPSED {
        0.0
    } else {
        (steps as f64 / elapsed_secs).clamp(0.0, MAX_RATE)
    }
}
