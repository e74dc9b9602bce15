//! Periodic hard target-network updates.
//!
//! The target copy only changes every `period` training steps:
//!
//! ```text
//! θ_target ← θ_online    when step % period == 0
//! ```

/// Decides when to copy online parameters into the target.
#[derive(Debug, Clone)]
pub struct TargetUpdater {
    period: u64,
    steps: u64,
    updates: u64,
}

impl TargetUpdater {
    /// `period` of 0 is treated as 1.
    pub fn new(period: u64) -> Self {
        Self::starting_at(period, 0)
    }

    /// Continue counting from `steps` already taken (after a restore).
    pub fn starting_at(period: u64, steps: u64) -> Self {
        Self {
            period: period.max(1),
            steps,
            updates: 0,
        }
    }

    /// Count one training step and copy `online` into `target` if due.
    ///
    /// Returns whether the target changed.
    pub fn maybe_update<P: Clone>(&mut self, online: &P, target: &mut P) -> bool {
        self.steps += 1;
        if self.steps % self.period == 0 {
            target.clone_from(online);
            self.updates += 1;
            true
        } else {
            false
        }
    }

    pub fn period(&self) -> u64 {
        self.period
    }

    /// Steps counted so far, restored ones included.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Copies performed by this updater.
    pub fn updates(&self) -> u64 {
        self.updates
    }
}
