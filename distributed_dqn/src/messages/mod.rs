//! Message types exchanged between workers.
//!
//! # Architecture
//!
//! ```text
//!                     +-------------------+
//!                     |     Launcher      |
//!                     +-------------------+
//!           ActorMsg /        | LearnerMsg  \ join -> NodeFinished
//!                   v         v              v
//!    +----------+      +----------+      +------------+
//!    | Actor    |      | Learner  |      | Evaluator  |
//!    +----------+      +----------+      +------------+
//!          \                 |                  /
//!           +------- CounterMsg --------------+
//!                            v
//!                     +-------------+
//!                     |   Counter   |
//!                     +-------------+
//! ```

mod counter_msg;
mod episode_stats;
mod finish;
mod learner_msg;


pub use counter_msg::{CounterMsg, CounterSnapshot, Counts};
pub use episode_stats::{ActorMsg, EpisodeStats};
pub use finish::{FinishReason, NodeFinished};
pub use learner_msg::{LearnerMsg, LearnerStats};
pub(crate) use learner_msg::safe_steps_per_second;
