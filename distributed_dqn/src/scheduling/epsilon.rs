//! Exploration schedules for epsilon-greedy acting.
//!
//! # Data Integrity
//!
//! Every schedule returns a probability in `[0, 1]`. Constructors validate
//! their inputs in debug builds and sanitize them in release builds so a bad
//! configuration cannot push NaN into the action-selection coin flip.

use serde::{Deserialize, Serialize};

/// Step-dependent exploration probability.
pub trait ExplorationSchedule: Send + Sync {
    /// Epsilon at the given (actor-local) step.
    fn epsilon(&self, step: u64) -> f64;
}

fn sanitize(epsilon: f64) -> f64 {
    if epsilon.is_finite() {
        epsilon.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Fixed epsilon (evaluators).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantEpsilon {
    epsilon: f64,
}

impl ConstantEpsilon {
    /// # Panics (debug only)
    ///
    /// Panics if `epsilon` is outside `[0, 1]` or not finite.
    pub fn new(epsilon: f64) -> Self {
        debug_assert!(
            epsilon.is_finite() && (0.0..=1.0).contains(&epsilon),
            "ConstantEpsilon: epsilon must be in [0, 1], got {}",
            epsilon
        );
        Self {
            epsilon: sanitize(epsilon),
        }
    }
}

impl ExplorationSchedule for ConstantEpsilon {
    fn epsilon(&self, _step: u64) -> f64 {
        self.epsilon
    }
}

/// Linear anneal from `start` to `end` over `decay_steps`, then flat.
///
/// With `start = 1.0` this is the usual Atari actor schedule: act uniformly
/// at random first, settle on the actor's own epsilon later.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearDecayEpsilon {
    start: f64,
    end: f64,
    decay_steps: u64,
}

impl LinearDecayEpsilon {
    /// # Panics (debug only)
    ///
    /// Panics if either endpoint is outside `[0, 1]`.
    pub fn new(start: f64, end: f64, decay_steps: u64) -> Self {
        debug_assert!(
            start.is_finite() && (0.0..=1.0).contains(&start),
            "LinearDecayEpsilon: start must be in [0, 1], got {}",
            start
        );
        debug_assert!(
            end.is_finite() && (0.0..=1.0).contains(&end),
            "LinearDecayEpsilon: end must be in [0, 1], got {}",
            end
        );
        Self {
            start: sanitize(start),
            end: sanitize(end),
            decay_steps,
        }
    }

    /// Anneal from 1.0 down to `end`.
    pub fn atari(end: f64, decay_steps: u64) -> Self {
        Self::new(1.0, end, decay_steps)
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn decay_steps(&self) -> u64 {
        self.decay_steps
    }
}

impl ExplorationSchedule for LinearDecayEpsilon {
    fn epsilon(&self, step: u64) -> f64 {
        if self.decay_steps == 0 {
            return self.end;
        }
        let progress = (step as f64 / self.decay_steps as f64).min(1.0);
        sanitize(self.start + (self.end - self.start) * progress)
    }
}

/// Order in which spread epsilons are assigned to actor ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpreadOrder {
    /// Actor 0 explores least, the last actor most.
    #[default]
    Ascending,
    /// Actor 0 explores most.
    Descending,
}

/// Log-spaced per-actor epsilons: `base^e` for `e` evenly spaced over
/// `[min_exponent, max_exponent]`.
///
/// With the defaults (`0.4`, `1`, `8`) the values lie in
/// `[0.4^8, 0.4] ≈ [0.00066, 0.4]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpsilonSpread {
    pub base: f64,
    pub min_exponent: f64,
    pub max_exponent: f64,
    pub order: SpreadOrder,
}

impl Default for EpsilonSpread {
    fn default() -> Self {
        Self {
            base: 0.4,
            min_exponent: 1.0,
            max_exponent: 8.0,
            order: SpreadOrder::Ascending,
        }
    }
}

impl EpsilonSpread {
    pub fn with_order(mut self, order: SpreadOrder) -> Self {
        self.order = order;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.base > 0.0 && self.base < 1.0) {
            return Err(format!("epsilon base must be in (0, 1), got {}", self.base));
        }
        if !self.min_exponent.is_finite()
            || !self.max_exponent.is_finite()
            || self.min_exponent < 0.0
            || self.min_exponent > self.max_exponent
        {
            return Err(format!(
                "epsilon exponents must satisfy 0 <= min <= max, got [{}, {}]",
                self.min_exponent, self.max_exponent
            ));
        }
        Ok(())
    }

    /// Largest epsilon the spread can produce.
    pub fn high(&self) -> f64 {
        self.base.powf(self.min_exponent)
    }

    /// Smallest epsilon the spread can produce.
    pub fn low(&self) -> f64 {
        self.base.powf(self.max_exponent)
    }

    /// Epsilons for `num_actors` actors, indexed by actor id.
    ///
    /// A single actor gets the largest value.
    pub fn epsilons(&self, num_actors: usize) -> Vec<f64> {
        let span = self.max_exponent - self.min_exponent;
        // Largest epsilon first.
        let mut values: Vec<f64> = (0..num_actors)
            .map(|i| {
                let t = if num_actors > 1 {
                    i as f64 / (num_actors - 1) as f64
                } else {
                    0.0
                };
                self.base.powf(self.min_exponent + span * t)
            })
            .collect();

        if self.order == SpreadOrder::Ascending {
            values.reverse();
        }
        values
    }
}
