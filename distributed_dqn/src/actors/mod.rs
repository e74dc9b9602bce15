//! Experience-generating workers.
//!
//! - `Actor`: epsilon-greedy acting, n-step transitions into replay
//! - `Evaluator`: fixed-epsilon acting on a step budget, returns only
//! - `NStepAdder`: turns time steps into n-step transitions

pub mod actor;
pub mod adder;
pub mod evaluator;


pub use actor::{Actor, ActorConfig, ActorHandle, ActorState};
pub use adder::NStepAdder;
pub use evaluator::{Evaluator, EvaluatorConfig};

// Re-export from messages for convenience
pub use crate::messages::{ActorMsg, EpisodeStats};
