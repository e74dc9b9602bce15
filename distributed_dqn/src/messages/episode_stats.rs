//! Messages for actor and evaluator threads.
//!
//! # Data Integrity
//!
//! Episode statistics filter non-finite returns (NaN, Inf) out of the running
//! average so a single corrupted episode cannot poison the aggregate.

/// Commands sent to an actor or evaluator thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorMsg {
    /// Stop after the current environment step.
    Stop,
    /// Report statistics on the stats channel.
    RequestStats,
}

/// Statistics reported by an actor or evaluator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeStats {
    /// Worker identifier (actor id or evaluator id).
    pub worker_id: usize,

    /// Environment steps taken by this worker.
    pub steps: u64,

    /// Episodes completed, truncated ones included.
    pub episodes: u64,

    /// Episodes cut short by a step budget.
    pub truncated_episodes: u64,

    /// Episodes with finite returns used in the average.
    pub valid_episodes: u64,

    /// Episodes with non-finite returns that were filtered.
    pub filtered_episodes: u64,

    /// Average episode return over valid episodes.
    pub avg_episode_return: f64,

    /// Most recent episode return (may be non-finite for diagnostics).
    pub recent_episode_return: f64,

    /// Length of the most recent episode.
    pub recent_episode_length: u64,

    /// Exploration rate in use.
    pub epsilon: f64,

    /// Parameter version currently acting.
    pub params_version: u64,
}

impl EpisodeStats {
    /// Create new stats for a worker.
    pub fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            ..Default::default()
        }
    }

    /// Update stats after an episode ends.
    ///
    /// Uses Welford's online mean; non-finite returns are counted in
    /// `filtered_episodes` but excluded from the average.
    pub fn record_episode(&mut self, episode_return: f64, length: u64, truncated: bool) {
        self.episodes += 1;
        self.recent_episode_return = episode_return;
        self.recent_episode_length = length;
        if truncated {
            self.truncated_episodes += 1;
        }

        if !episode_return.is_finite() {
            self.filtered_episodes += 1;
            return;
        }

        // avg_new = avg_old + (x - avg_old) / n
        self.valid_episodes += 1;
        let delta = episode_return - self.avg_episode_return;
        self.avg_episode_return += delta / self.valid_episodes as f64;
    }

    /// Add environment steps (saturating).
    pub fn add_steps(&mut self, n: u64) {
        self.steps = self.steps.saturating_add(n);
    }

    /// Fraction of episodes filtered for non-finite returns.
    pub fn filtered_fraction(&self) -> f64 {
        if self.episodes == 0 {
            0.0
        } else {
            self.filtered_episodes as f64 / self.episodes as f64
        }
    }
}
