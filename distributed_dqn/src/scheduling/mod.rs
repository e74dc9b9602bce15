//! Exploration scheduling.
//!
//! ## Available Schedules
//!
//! - [`ConstantEpsilon`]: fixed epsilon (evaluators)
//! - [`LinearDecayEpsilon`]: linear anneal to a floor (actors)
//! - [`EpsilonSpread`]: log-spaced per-actor epsilon assignment
//!
//! ## Example
//!
//! ```rust,ignore
//! let epsilons = EpsilonSpread::default().epsilons(num_actors);
//! let schedule = LinearDecayEpsilon::atari(epsilons[actor_id], 250_000);
//!
//! // In the acting loop:
//! let epsilon = schedule.epsilon(local_step);
//! ```

pub mod epsilon;

#[cfg(test)]
mod tests;

pub use epsilon::{
    ConstantEpsilon,
    EpsilonSpread,
    ExplorationSchedule,
    LinearDecayEpsilon,
    SpreadOrder,
};
