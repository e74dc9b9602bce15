//! Parameter propagation from the learner to actors and evaluators.
//!
//! ```text
//!   Learner ──publish──► VariableSlot ◄──────────────── Evaluators
//!                            ▲                          (period 1)
//!                            │ refresh / stale-retry
//!                      VariableCache × num_caches
//!                            ▲
//!                            │ background fetch every update_period
//!                      VariableClient (one per actor)
//! ```

pub mod cache;
pub mod client;
pub mod slot;
pub mod source;

#[cfg(test)]
mod tests;

pub use cache::{CacheConfig, VariableCache};
pub use client::VariableClient;
pub use slot::{variable_slot, SharedVariableSlot, VariableSlot};
pub use source::{SharedVariableSource, VariableError, VariableSource};
