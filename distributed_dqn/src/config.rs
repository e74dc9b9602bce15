//! Configuration for a distributed DQN run.
//!
//! One struct carries every build-time parameter of the topology. Defaults
//! reproduce the reference agent; JSON files may override any subset of
//! fields.

use crate::checkpoint::CheckpointerConfig;
use crate::replay::{RateLimiter, TableConfig};
use crate::scheduling::EpsilonSpread;
use crate::variables::CacheConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration validation or loading error.
#[derive(Debug)]
pub enum ConfigError {
    /// A count parameter must be positive.
    InvalidCount {
        field: &'static str,
        value: usize,
    },
    /// A parameter is outside its valid range.
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    /// Parameters are inconsistent with each other.
    Invalid(String),
    /// The config file could not be read.
    Io(std::io::Error),
    /// The config file is not valid JSON for this struct.
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidCount { field, value } => {
                write!(f, "{} must be > 0, got {}", field, value)
            }
            ConfigError::OutOfRange { field, value, min, max } => {
                write!(f, "{} must be in [{}, {}], got {}", field, min, max, value)
            }
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {}", msg),
            ConfigError::Io(e) => write!(f, "cannot read config: {}", e),
            ConfigError::Parse(e) => write!(f, "cannot parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Configuration for distributed prioritized-replay DQN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributedDqnConfig {
    // Topology
    /// Number of actor threads
    pub num_actors: usize,
    /// Number of variable caches between the learner and the actors
    pub num_caches: usize,
    /// Number of evaluator threads
    pub num_evaluators: usize,

    // Learner
    /// Items per training batch
    pub batch_size: usize,
    /// Batches prefetched ahead of the learner
    pub prefetch_size: usize,
    /// Learner steps between hard target-network copies
    pub target_update_period: u64,
    /// Importance-sampling exponent (beta)
    pub importance_sampling_exponent: f64,
    /// Learning rate handed to the update rule
    pub learning_rate: f64,
    /// Per-step discount
    pub discount: f64,

    // Replay
    /// Target samples per insert (None or 0 = minimum-size gate only)
    pub samples_per_insert: Option<f64>,
    /// Items required before sampling starts
    pub min_replay_size: usize,
    /// Replay capacity
    pub max_replay_size: usize,
    /// Exponent applied to priorities (alpha)
    pub priority_exponent: f64,
    /// Priority given to freshly inserted transitions
    pub default_priority: f64,
    /// Steps folded into each transition
    pub n_step: usize,

    // Actors and evaluators
    /// Actor steps between background parameter fetches
    pub variable_update_period: usize,
    /// Fixed epsilon of the evaluators
    pub evaluator_epsilon: f64,
    /// Steps over which an actor anneals from 1.0 to its own epsilon
    pub epsilon_decay_steps: u64,
    /// Per-actor epsilon assignment
    pub epsilon_spread: EpsilonSpread,
    /// Evaluator step budget
    pub max_actor_steps: u64,

    // Variable caches
    /// Minimum time between cache refreshes, milliseconds
    pub cache_refresh_interval_ms: u64,
    /// Age at which cached parameters are refused, milliseconds
    pub cache_stale_after_ms: u64,

    // Persistence and logging
    /// Root directory for checkpoints (None = no checkpointing)
    pub checkpoint_dir: Option<PathBuf>,
    /// Seconds between counter checkpoints
    pub counter_checkpoint_secs: u64,
    /// Seconds between learner checkpoints
    pub learner_checkpoint_secs: u64,
    /// Checkpoints retained per component
    pub keep_checkpoints: usize,
    /// Minimum seconds between console metric lines per component
    pub log_interval_secs: f64,
    /// Directory for per-component CSV metrics (None = console only)
    pub csv_dir: Option<PathBuf>,
    /// Seed for replay sampling (None = from entropy)
    pub seed: Option<u64>,
}

impl Default for DistributedDqnConfig {
    fn default() -> Self {
        Self {
            num_actors: 4,
            num_caches: 1,
            num_evaluators: 1,

            batch_size: 256,
            prefetch_size: 4,
            target_update_period: 100,
            importance_sampling_exponent: 0.2,
            learning_rate: 1e-3,
            discount: 0.99,

            samples_per_insert: Some(32.0),
            min_replay_size: 1_000,
            max_replay_size: 1_000_000,
            priority_exponent: 0.6,
            default_priority: 4.0,
            n_step: 5,

            variable_update_period: 1_000,
            evaluator_epsilon: 0.0,
            epsilon_decay_steps: 250_000,
            epsilon_spread: EpsilonSpread::default(),
            max_actor_steps: 25_000_000,

            cache_refresh_interval_ms: 2_000,
            cache_stale_after_ms: 4_000,

            checkpoint_dir: None,
            counter_checkpoint_secs: 60,
            learner_checkpoint_secs: 3_600,
            keep_checkpoints: 2,
            log_interval_secs: 1.0,
            csv_dir: None,
            seed: None,
        }
    }
}

impl DistributedDqnConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a JSON string; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Set the number of actors.
    pub fn with_num_actors(mut self, n: usize) -> Self {
        self.num_actors = n;
        self
    }

    /// Set the number of variable caches.
    pub fn with_num_caches(mut self, n: usize) -> Self {
        self.num_caches = n;
        self
    }

    /// Set the number of evaluators.
    pub fn with_num_evaluators(mut self, n: usize) -> Self {
        self.num_evaluators = n;
        self
    }

    /// Set batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the replay size bounds.
    pub fn with_replay_size(mut self, min: usize, max: usize) -> Self {
        self.min_replay_size = min;
        self.max_replay_size = max;
        self
    }

    /// Set the sample-to-insert ratio (None = minimum-size gate only).
    pub fn with_samples_per_insert(mut self, spi: Option<f64>) -> Self {
        self.samples_per_insert = spi;
        self
    }

    /// Set the target-network copy period.
    pub fn with_target_update_period(mut self, period: u64) -> Self {
        self.target_update_period = period;
        self
    }

    /// Set the n-step horizon.
    pub fn with_n_step(mut self, n_step: usize) -> Self {
        self.n_step = n_step;
        self
    }

    /// Set the actor parameter-fetch period.
    pub fn with_variable_update_period(mut self, period: usize) -> Self {
        self.variable_update_period = period;
        self
    }

    /// Set the evaluator step budget.
    pub fn with_max_actor_steps(mut self, steps: u64) -> Self {
        self.max_actor_steps = steps;
        self
    }

    /// Set the actor epsilon anneal length.
    pub fn with_epsilon_decay_steps(mut self, steps: u64) -> Self {
        self.epsilon_decay_steps = steps;
        self
    }

    /// Set the evaluator epsilon.
    pub fn with_evaluator_epsilon(mut self, epsilon: f64) -> Self {
        self.evaluator_epsilon = epsilon;
        self
    }

    /// Set cache timing.
    pub fn with_cache_timing(mut self, refresh: Duration, stale_after: Duration) -> Self {
        self.cache_refresh_interval_ms = refresh.as_millis() as u64;
        self.cache_stale_after_ms = stale_after.as_millis() as u64;
        self
    }

    /// Enable checkpointing under `dir`.
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    /// Enable per-component CSV metrics under `dir`.
    pub fn with_csv_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.csv_dir = Some(dir.into());
        self
    }

    /// Seed replay sampling.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Rate limiter tolerance: one batch worth of samples.
    pub fn error_buffer(&self) -> f64 {
        self.batch_size as f64
    }

    /// Replay admission policy.
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::from_ratio(self.min_replay_size, self.samples_per_insert, self.error_buffer())
    }

    /// Replay table configuration.
    pub fn table_config(&self) -> TableConfig {
        let config = TableConfig::new(self.max_replay_size, self.rate_limiter())
            .with_priority_exponent(self.priority_exponent);
        match self.seed {
            Some(seed) => config.with_seed(seed),
            None => config,
        }
    }

    /// Variable cache timing.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(
            Duration::from_millis(self.cache_refresh_interval_ms),
            Duration::from_millis(self.cache_stale_after_ms),
        )
    }

    /// Checkpointer for one component, if checkpointing is enabled.
    pub fn checkpointer_config(&self, component: &str, interval_secs: u64) -> Option<CheckpointerConfig> {
        self.checkpoint_dir.as_ref().map(|dir| {
            CheckpointerConfig::new(dir.join(component))
                .with_keep_last_n(self.keep_checkpoints)
                .with_time_delta(Duration::from_secs(interval_secs))
        })
    }

    /// Console throttle for metric lines.
    pub fn log_interval(&self) -> Duration {
        Duration::from_secs_f64(self.log_interval_secs.max(0.0))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts: [(&'static str, usize); 6] = [
            ("num_caches", self.num_caches),
            ("batch_size", self.batch_size),
            ("prefetch_size", self.prefetch_size),
            ("n_step", self.n_step),
            ("max_replay_size", self.max_replay_size),
            ("variable_update_period", self.variable_update_period),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(ConfigError::InvalidCount { field, value });
            }
        }
        if self.target_update_period == 0 {
            return Err(ConfigError::InvalidCount {
                field: "target_update_period",
                value: 0,
            });
        }

        let ranges: [(&'static str, f64, f64, f64); 6] = [
            ("discount", self.discount, 0.0, 1.0),
            ("evaluator_epsilon", self.evaluator_epsilon, 0.0, 1.0),
            ("importance_sampling_exponent", self.importance_sampling_exponent, 0.0, 1.0),
            ("priority_exponent", self.priority_exponent, 0.0, f64::MAX),
            ("default_priority", self.default_priority, 0.0, f64::MAX),
            ("learning_rate", self.learning_rate, f64::MIN_POSITIVE, f64::MAX),
        ];
        for (field, value, min, max) in ranges {
            if !value.is_finite() || value < min || value > max {
                return Err(ConfigError::OutOfRange { field, value, min, max });
            }
        }

        self.table_config().validate().map_err(ConfigError::Invalid)?;
        self.cache_config().validate().map_err(ConfigError::Invalid)?;
        self.epsilon_spread.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }
}
