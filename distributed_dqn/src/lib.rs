//! # Distributed DQN: prioritized replay with many actors
//!
//! A single-process, multi-threaded rendition of a distributed DQN-style
//! training topology. Every node runs on its own named OS thread and talks
//! to the others through shared, lock-protected services.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  actor-0 .. actor-N          evaluator-0 .. evaluator-M              │
//! │  ┌────────┐ ┌────────┐       ┌───────────┐                          │
//! │  │ env    │ │ env    │       │ env (var) │                          │
//! │  │ ε-greedy│ │ n-step │       │ fixed ε   │                          │
//! │  └──┬──▲──┘ └──┬──▲──┘       └─────▲─────┘                          │
//! │     │  │       │  │                │ every step                     │
//! │     │  └── VariableCache ◄──────┐  │                                │
//! │     ▼                           │  │                                │
//! │  ┌────────────────┐        ┌────┴──┴──────┐                         │
//! │  │ ReplayTable    │───────►│ Learner      │──► VariableSlot          │
//! │  │ (sum tree,     │ sample │ target net,  │                         │
//! │  │  rate limiter) │◄───────│ priorities   │                         │
//! │  └────────────────┘ update └──────┬───────┘                         │
//! │                                   ▼                                 │
//! │                         Counter service (checkpointed)              │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use distributed_dqn::{DistributedDqnConfig, Program};
//! use std::sync::Arc;
//!
//! let config = DistributedDqnConfig::new()
//!     .with_num_actors(8)
//!     .with_num_caches(2)
//!     .with_checkpoint_dir("runs/pong");
//!
//! let program = Program::new(config, Arc::new(MyEnvs), Arc::new(MyNetworks))?;
//! let finished = program.launch()?.run_until_evaluators_finish();
//! ```
//!
//! The crate never touches tensors: parameters are any `P: Clone + Serialize`
//! and the update rule is supplied through [`network::NetworkFactory`].

pub mod core;
pub mod messages;
pub mod replay;
pub mod counter;
pub mod variables;
pub mod checkpoint;
pub mod metrics;
pub mod scheduling;
pub mod environment;
pub mod network;
pub mod config;
pub mod actors;
pub mod learner;
pub mod topology;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use core::{Clock, ManualClock, SharedClock, Snapshot, StepType, TimeStep, Transition};

pub use replay::{
    replay_table, DatasetConfig, RateLimiter, ReplayDataset, ReplayError, ReplayTable,
    SampledItem, SharedReplayTable, TableConfig,
};

pub use counter::{spawn_counter, CounterClient, CounterConfig, CounterHandle, ScopedCounter};

pub use variables::{
    CacheConfig, SharedVariableSlot, SharedVariableSource, VariableCache, VariableClient,
    VariableError, VariableSlot, VariableSource,
};

pub use messages::{ActorMsg, EpisodeStats, FinishReason, LearnerMsg, LearnerStats, NodeFinished};

pub use actors::{Actor, ActorConfig, ActorHandle, Evaluator, EvaluatorConfig, NStepAdder};
pub use learner::{Learner, LearnerConfig, LearnerHandle, LearnerState};

// Pluggable collaborators
pub use environment::{ActionSpec, Environment, EnvironmentFactory, EnvironmentVariant};
pub use network::{NetworkFactory, Policy, StepOutput, TrainingBatch, TrainingStep, UpdateHyperparams};

// Exploration
pub use scheduling::{EpsilonSpread, ExplorationSchedule, LinearDecayEpsilon, SpreadOrder};

// Configuration and launch
pub use config::{ConfigError, DistributedDqnConfig};
pub use topology::{LaunchError, Program, RunningProgram, TopologyPlan};

pub use checkpoint::{Checkpointer, CheckpointerConfig, CheckpointError, CheckpointingRunner};
pub use metrics::{make_default_logger, Metrics, MetricsLogger};
