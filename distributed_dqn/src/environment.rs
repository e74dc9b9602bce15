//! Environment abstraction.
//!
//! The simulator itself is external; workers only need to reset it, step it
//! with a discrete action and know how many actions exist.

use crate::core::TimeStep;
use serde::{Deserialize, Serialize};

/// Discrete action space description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Number of discrete actions.
    pub num_actions: u32,
}

impl ActionSpec {
    pub fn new(num_actions: u32) -> Self {
        Self { num_actions }
    }

    /// Uniformly random action.
    pub fn sample(&self) -> u32 {
        fastrand::u32(0..self.num_actions.max(1))
    }

    pub fn contains(&self, action: u32) -> bool {
        action < self.num_actions
    }
}

/// Which level distribution an environment instance draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvironmentVariant {
    /// The distribution actors train on.
    TrainingDistribution,
    /// Levels never seen in training.
    HeldOutDistribution,
}

impl EnvironmentVariant {
    /// Evaluator 0 measures training performance, the others generalization.
    pub fn for_evaluator(evaluator_id: usize) -> Self {
        if evaluator_id == 0 {
            EnvironmentVariant::TrainingDistribution
        } else {
            EnvironmentVariant::HeldOutDistribution
        }
    }
}

/// Single episodic environment owned by one worker thread.
pub trait Environment: Send {
    /// Start a new episode; returns a `First` time step.
    fn reset(&mut self) -> TimeStep;

    /// Apply `action`; returns a `Mid` or `Last` time step.
    fn step(&mut self, action: u32) -> TimeStep;

    /// Action space.
    fn action_spec(&self) -> ActionSpec;
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn reset(&mut self) -> TimeStep {
        (**self).reset()
    }

    fn step(&mut self, action: u32) -> TimeStep {
        (**self).step(action)
    }

    fn action_spec(&self) -> ActionSpec {
        (**self).action_spec()
    }
}

/// Builds environments for workers. Called once per worker, on the
/// launching thread.
pub trait EnvironmentFactory: Send + Sync {
    /// Fresh environment of the given variant.
    fn make_environment(&self, variant: EnvironmentVariant) -> Box<dyn Environment>;

    /// Action space shared by every variant.
    fn action_spec(&self) -> ActionSpec;
}
