//! Wiring of the distributed program.
//!
//! - `TopologyPlan`: which nodes exist, their epsilons and cache assignment
//! - `Program`: builds collaborators and spawns one thread per node
//! - `RunningProgram`: handles for stopping and joining the nodes

mod plan;
mod program;


pub use plan::{ActorNode, EvaluatorNode, TopologyPlan};
pub use program::{LaunchError, Program, RunningProgram};
