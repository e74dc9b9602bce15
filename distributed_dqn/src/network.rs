//! Network and training-step collaborators.
//!
//! The crate never looks inside parameters: it clones them, publishes them,
//! serializes them into checkpoints and hands them back to these traits.

use crate::core::Transition;
use crate::environment::ActionSpec;
use crate::metrics::Metrics;
use crate::replay::SampledItem;

/// Greedy action selection from given parameters.
pub trait Policy<P>: Send {
    /// Best action for `observation` under `params`.
    fn select_action(&mut self, params: &P, observation: &[f32]) -> u32;
}

impl<P, F> Policy<P> for F
where
    F: FnMut(&P, &[f32]) -> u32 + Send,
{
    fn select_action(&mut self, params: &P, observation: &[f32]) -> u32 {
        self(params, observation)
    }
}

/// Builds parameters and policies.
pub trait NetworkFactory<P>: Send + Sync {
    /// Freshly initialized parameters.
    fn initial_parameters(&self, spec: &ActionSpec) -> P;

    /// Policy used by one actor or evaluator.
    fn make_policy(&self, spec: &ActionSpec) -> Box<dyn Policy<P>>;

    /// Update rule used by the learner.
    fn make_training_step(
        &self,
        spec: &ActionSpec,
        hyperparams: &UpdateHyperparams,
    ) -> Box<dyn TrainingStep<P>>;
}

/// Settings handed to the update rule when it is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateHyperparams {
    /// Optimizer learning rate.
    pub learning_rate: f64,
    /// Per-step discount the adder already folded into transitions.
    pub discount: f64,
    /// Steps per transition.
    pub n_step: usize,
}

/// One training batch as seen by the update rule.
pub struct TrainingBatch<'a> {
    /// Sampled transitions.
    pub items: &'a [SampledItem<Transition>],
    /// Importance-sampling weights, one per item, max-normalized to 1.
    pub importance_weights: &'a [f64],
}

impl TrainingBatch<'_> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Result of one update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutput {
    /// New priority per batch item, in batch order.
    pub priorities: Vec<f64>,
    /// Scalars to log (loss, mean |TD error|, ...).
    pub metrics: Metrics,
}

/// The loss and optimizer step. Runs on the learner thread only.
pub trait TrainingStep<P>: Send {
    /// Update `online` in place using the frozen `target`.
    fn step(&mut self, batch: &TrainingBatch<'_>, online: &mut P, target: &P) -> StepOutput;
}
