//! State checkpointing.
//!
//! Learner and counter state is written as JSON snapshots into a directory,
//! keeping only the most recent few.
//!
//! ## Example
//!
//! ```rust,ignore
//! let config = CheckpointerConfig::new("./checkpoints/learner")
//!     .with_keep_last_n(2)
//!     .with_time_delta(Duration::from_secs(3600));
//!
//! let mut runner = CheckpointingRunner::new(Checkpointer::new(config)?, system_clock());
//! let state: LearnerState<P> = runner.restore().unwrap_or_else(fresh_state);
//!
//! // In the owner's loop:
//! runner.maybe_save(&state)?;
//! ```

pub mod checkpointer;

pub use checkpointer::{
    Checkpointer,
    CheckpointerConfig,
    CheckpointInfo,
    CheckpointError,
    CheckpointingRunner,
};
