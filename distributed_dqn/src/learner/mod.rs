//! Learner system.
//!
//! - `Learner`: prioritized-replay training loop with target network
//! - `TargetUpdater`: periodic hard target copies
//! - `LearnerState`: what the learner checkpoints

pub mod learner;
pub mod target;

#[cfg(test)]
mod tests;

pub use learner::{importance_weights, Learner, LearnerConfig, LearnerHandle, LearnerState};
pub use target::TargetUpdater;

// Re-export from messages for convenience
pub use crate::messages::{LearnerMsg, LearnerStats};
