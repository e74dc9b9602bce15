//! Rate limiting between replay producers (actors) and the consumer (learner).
//!
//! The limiter sees three numbers: cumulative inserts `I`, cumulative samples
//! `S` and the current table size. It never blocks on its own; the table
//! consults it under its lock and parks callers on a condvar while it says no.
//!
//! # Sample-to-insert ratio
//!
//! ```text
//! insert allowed  <=>  size + 1 <= min_size_to_sample            (warm-up)
//!                  ||  (I + 1) * spi - S <= error_buffer
//! sample allowed  <=>  size >= min_size_to_sample
//!                  &&  I * spi - (S + 1) >= -error_buffer
//! ```
//!
//! Once warm-up is over, every completed insert leaves
//! `S` within `[I * spi - error_buffer, I * spi + error_buffer]`.
//! `error_buffer >= max(1, spi)` guarantees the two sides are never blocked
//! at the same time.

use serde::{Deserialize, Serialize};

/// Counters the limiter decides on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimiterState {
    /// Cumulative successful inserts
    pub inserts: u64,
    /// Cumulative sampled items
    pub samples: u64,
    /// Items currently stored
    pub size: usize,
}

/// Admission policy for replay inserts and samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RateLimiter {
    /// Pure minimum-size gate; inserts are never blocked.
    MinSize {
        min_size_to_sample: usize,
    },
    /// Keep the sample/insert ratio close to `samples_per_insert`.
    SampleToInsertRatio {
        min_size_to_sample: usize,
        samples_per_insert: f64,
        error_buffer: f64,
    },
}

impl RateLimiter {
    /// Minimum-size gate.
    pub fn min_size(min_size_to_sample: usize) -> Self {
        RateLimiter::MinSize { min_size_to_sample }
    }

    /// Ratio-coupled limiter.
    pub fn sample_to_insert_ratio(
        min_size_to_sample: usize,
        samples_per_insert: f64,
        error_buffer: f64,
    ) -> Self {
        RateLimiter::SampleToInsertRatio {
            min_size_to_sample,
            samples_per_insert,
            error_buffer,
        }
    }

    /// Pick the limiter the way the agent configuration describes it: an
    /// unset or zero `samples_per_insert` degenerates to `MinSize`.
    pub fn from_ratio(
        min_size_to_sample: usize,
        samples_per_insert: Option<f64>,
        error_buffer: f64,
    ) -> Self {
        match samples_per_insert {
            Some(spi) if spi > 0.0 => {
                Self::sample_to_insert_ratio(min_size_to_sample, spi, error_buffer)
            }
            _ => Self::min_size(min_size_to_sample),
        }
    }

    /// Minimum number of stored items before sampling may start.
    pub fn min_size_to_sample(&self) -> usize {
        match *self {
            RateLimiter::MinSize { min_size_to_sample } => min_size_to_sample,
            RateLimiter::SampleToInsertRatio { min_size_to_sample, .. } => min_size_to_sample,
        }
    }

    /// Check the limiter parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_size_to_sample() == 0 {
            return Err("min_size_to_sample must be >= 1".to_string());
        }
        if let RateLimiter::SampleToInsertRatio {
            samples_per_insert,
            error_buffer,
            ..
        } = *self
        {
            if !samples_per_insert.is_finite() || samples_per_insert <= 0.0 {
                return Err(format!(
                    "samples_per_insert must be finite and > 0, got {}",
                    samples_per_insert
                ));
            }
            let min_buffer = samples_per_insert.max(1.0);
            if !error_buffer.is_finite() || error_buffer < min_buffer {
                return Err(format!(
                    "error_buffer must be >= max(1, samples_per_insert) = {}, got {}",
                    min_buffer, error_buffer
                ));
            }
        }
        Ok(())
    }

    /// Whether one more insert may proceed.
    pub fn can_insert(&self, state: &LimiterState) -> bool {
        match *self {
            RateLimiter::MinSize { .. } => true,
            RateLimiter::SampleToInsertRatio {
                min_size_to_sample,
                samples_per_insert,
                error_buffer,
            } => {
                if state.size + 1 <= min_size_to_sample {
                    return true;
                }
                let diff = (state.inserts + 1) as f64 * samples_per_insert - state.samples as f64;
                diff <= error_buffer
            }
        }
    }

    /// Whether one more sample may proceed.
    pub fn can_sample(&self, state: &LimiterState) -> bool {
        if state.size < self.min_size_to_sample() {
            return false;
        }
        match *self {
            RateLimiter::MinSize { .. } => true,
            RateLimiter::SampleToInsertRatio {
                samples_per_insert,
                error_buffer,
                ..
            } => {
                let diff = state.inserts as f64 * samples_per_insert - (state.samples + 1) as f64;
                diff >= -error_buffer
            }
        }
    }
}
