//! Experience types exchanged between actors, the replay store and the learner.
//!
//! - `TimeStep`: What an environment returns from `reset()` / `step()`
//! - `Transition`: One n-step aggregated unit of experience stored in replay
//!
//! Transitions are immutable once built. The replay table wraps them in an
//! `Arc` so sampling hands out cheap shared references instead of copies.

use serde::{Deserialize, Serialize};

/// Position of a timestep within its episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepType {
    /// First timestep of an episode (returned by `reset()`).
    First,
    /// Any timestep strictly inside an episode.
    Mid,
    /// Final timestep of an episode.
    Last,
}

/// A single environment timestep.
///
/// `reward` and `discount` describe the transition that *led* to this
/// observation; they are meaningless on a `First` step.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeStep {
    pub step_type: StepType,
    pub observation: Vec<f32>,
    pub reward: f32,
    /// Environment discount in [0, 1]; 0 on true terminations.
    pub discount: f32,
}

impl TimeStep {
    /// Create the first timestep of an episode.
    pub fn first(observation: Vec<f32>) -> Self {
        Self {
            step_type: StepType::First,
            observation,
            reward: 0.0,
            discount: 1.0,
        }
    }

    /// Create an intermediate timestep.
    pub fn mid(observation: Vec<f32>, reward: f32) -> Self {
        Self {
            step_type: StepType::Mid,
            observation,
            reward,
            discount: 1.0,
        }
    }

    /// Create a terminal timestep (discount 0).
    pub fn termination(observation: Vec<f32>, reward: f32) -> Self {
        Self {
            step_type: StepType::Last,
            observation,
            reward,
            discount: 0.0,
        }
    }

    /// Create a truncated final timestep (discount 1, bootstrapping allowed).
    pub fn truncation(observation: Vec<f32>, reward: f32) -> Self {
        Self {
            step_type: StepType::Last,
            observation,
            reward,
            discount: 1.0,
        }
    }

    /// True if this is the first step of an episode.
    pub fn is_first(&self) -> bool {
        self.step_type == StepType::First
    }

    /// True if this step ends the episode.
    pub fn is_last(&self) -> bool {
        self.step_type == StepType::Last
    }
}

/// N-step transition stored in the replay table.
///
/// `reward` is the discounted sum of the rewards collected over the window
/// and `discount` the product of agent and environment discounts over the
/// same window, so a learner bootstraps with
/// `reward + discount * Q_target(next_observation)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Observation the action was taken from
    pub observation: Vec<f32>,
    /// Discrete action index
    pub action: u32,
    /// Accumulated n-step reward
    pub reward: f32,
    /// Accumulated n-step discount
    pub discount: f32,
    /// Observation n steps later (or at episode end)
    pub next_observation: Vec<f32>,
}

impl Transition {
    /// Create a new transition.
    pub fn new(
        observation: Vec<f32>,
        action: u32,
        reward: f32,
        discount: f32,
        next_observation: Vec<f32>,
    ) -> Self {
        Self {
            observation,
            action,
            reward,
            discount,
            next_observation,
        }
    }

    /// True when the transition ends in a termination (no bootstrapping).
    pub fn is_terminal(&self) -> bool {
        self.discount == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestep_constructors() {
        let first = TimeStep::first(vec![0.0]);
        assert!(first.is_first());
        assert!(!first.is_last());

        let term = TimeStep::termination(vec![1.0], 2.0);
        assert!(term.is_last());
        assert_eq!(term.discount, 0.0);

        let trunc = TimeStep::truncation(vec![1.0], 2.0);
        assert!(trunc.is_last());
        assert_eq!(trunc.discount, 1.0);
    }

    #[test]
    fn test_transition_terminal() {
        let t = Transition::new(vec![0.0], 1, 1.0, 0.0, vec![1.0]);
        assert!(t.is_terminal());
        let t = Transition::new(vec![0.0], 1, 1.0, 0.99, vec![1.0]);
        assert!(!t.is_terminal());
    }
}
