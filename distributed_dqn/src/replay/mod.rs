//! Prioritized, rate-limited replay store.
//!
//! - [`ReplayTable`]: bounded FIFO storage with proportional prioritized
//!   sampling and blocking admission control
//! - [`RateLimiter`]: the insert/sample admission policy
//! - [`ReplayDataset`]: background prefetching of sampled batches
//!
//! ## Example
//!
//! ```rust,ignore
//! let table = replay_table(TableConfig::new(
//!     1_000_000,
//!     RateLimiter::sample_to_insert_ratio(1_000, 32.0, 256.0),
//! ));
//!
//! // Actor
//! table.insert(transition, 4.0)?;
//!
//! // Learner
//! let dataset = ReplayDataset::new(table.clone(), DatasetConfig::new(256, 4));
//! let batch = dataset.next_batch(Duration::from_secs(1))?;
//! ```

pub mod dataset;
pub mod rate_limiter;
pub mod sum_tree;
pub mod table;


pub use dataset::{DatasetConfig, ReplayDataset};
pub use rate_limiter::{LimiterState, RateLimiter};
pub use sum_tree::SumTree;
pub use table::{
    replay_table, ReplayError, ReplayTable, SampledItem, SharedReplayTable, TableConfig,
    TableInfo,
};
