//! N-step transition builder.
//!
//! For a window starting at step `t` of length `m` (`m = n` while the episode
//! runs, shorter at episode end) the adder emits
//!
//! ```text
//! R = Σ_{k<m} (Π_{j<k} γ·d_{t+j}) · r_{t+k}
//! D = Π_{k<m} γ·d_{t+k}
//! ```
//!
//! where `d` is the environment discount carried by each time step.

use crate::core::{TimeStep, Transition};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
struct PendingStep {
    observation: Vec<f32>,
    action: u32,
    reward: f32,
    discount: f32,
}

/// Sliding window turning time steps into n-step transitions.
#[derive(Debug, Clone)]
pub struct NStepAdder {
    n_step: usize,
    discount: f32,
    window: VecDeque<PendingStep>,
    last_observation: Option<Vec<f32>>,
}

impl NStepAdder {
    /// `n_step` of 0 is treated as 1.
    pub fn new(n_step: usize, discount: f32) -> Self {
        let n_step = n_step.max(1);
        Self {
            n_step,
            discount,
            window: VecDeque::with_capacity(n_step),
            last_observation: None,
        }
    }

    pub fn n_step(&self) -> usize {
        self.n_step
    }

    /// Steps waiting for their window to fill.
    pub fn pending(&self) -> usize {
        self.window.len()
    }

    /// Start a new episode. Any unfinished window is dropped.
    pub fn add_first(&mut self, timestep: &TimeStep) {
        self.window.clear();
        self.last_observation = Some(timestep.observation.clone());
    }

    /// Record `action` and the time step it produced.
    ///
    /// Returns the transitions completed by this step, oldest first. When
    /// `next` ends the episode every pending window is flushed.
    pub fn add(&mut self, action: u32, next: &TimeStep) -> Vec<Transition> {
        let Some(observation) = self.last_observation.replace(next.observation.clone()) else {
            log::warn!("[NStepAdder] step added before add_first, ignoring");
            self.last_observation = None;
            return Vec::new();
        };

        self.window.push_back(PendingStep {
            observation,
            action,
            reward: next.reward,
            discount: next.discount,
        });

        let mut out = Vec::new();
        if next.is_last() {
            while let Some(transition) = self.emit_front(&next.observation) {
                out.push(transition);
            }
            self.last_observation = None;
        } else if self.window.len() == self.n_step {
            out.extend(self.emit_front(&next.observation));
        }
        out
    }

    fn emit_front(&mut self, next_observation: &[f32]) -> Option<Transition> {
        let mut reward = 0.0f32;
        let mut discount = 1.0f32;
        for step in &self.window {
            reward += discount * step.reward;
            discount *= self.discount * step.discount;
        }

        let front = self.window.pop_front()?;
        Some(Transition::new(
            front.observation,
            front.action,
            reward,
            discount,
            next_observation.to_vec(),
        ))
    }
}
