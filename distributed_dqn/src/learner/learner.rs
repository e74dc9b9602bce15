//! Learner: prioritized-replay training loop.
//!
//! Each step:
//!
//! ```text
//!   dataset ──batch──► IS weights (N·P)^-β / max ──► TrainingStep(online, target)
//!      ▲                                                     │ priorities
//!      └────────────── update_priorities(keys) ◄─────────────┘
//!   every period: target ← online;  every step: publish(online), counter.steps += 1
//! ```
//!
//! # Thread Safety and Lifecycle
//!
//! The learner owns its parameters outright. Readers only ever see the
//! immutable copies published into the `VariableSlot`. The thread exits on a
//! stop command, on the stop flag, when replay closes, or after
//! `max_train_steps`; it writes a final checkpoint on the way out.

use super::target::TargetUpdater;
use crate::checkpoint::CheckpointingRunner;
use crate::core::Transition;
use crate::counter::ScopedCounter;
use crate::messages::{safe_steps_per_second, FinishReason, LearnerMsg, LearnerStats};
use crate::metrics::BoxedLogger;
use crate::network::{TrainingBatch, TrainingStep};
use crate::replay::{ReplayDataset, ReplayError, SampledItem};
use crate::variables::SharedVariableSlot;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Learner configuration.
#[derive(Debug, Clone)]
pub struct LearnerConfig {
    /// Importance-sampling exponent (beta)
    pub importance_sampling_exponent: f64,
    /// Training steps between hard target copies
    pub target_update_period: u64,
    /// How long to wait for a batch before rechecking commands
    pub batch_timeout: Duration,
    /// Stats reporting frequency (in train steps)
    pub stats_freq: u64,
    /// Maximum training steps (0 = unlimited)
    pub max_train_steps: u64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            importance_sampling_exponent: 0.2,
            target_update_period: 100,
            batch_timeout: Duration::from_millis(100),
            stats_freq: 100,
            max_train_steps: 0,
        }
    }
}

impl LearnerConfig {
    /// Create config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the importance-sampling exponent.
    pub fn with_importance_sampling_exponent(mut self, beta: f64) -> Self {
        self.importance_sampling_exponent = beta;
        self
    }

    /// Set the target copy period.
    pub fn with_target_update_period(mut self, period: u64) -> Self {
        self.target_update_period = period;
        self
    }

    /// Set stats reporting frequency.
    pub fn with_stats_freq(mut self, freq: u64) -> Self {
        self.stats_freq = freq;
        self
    }

    /// Set maximum training steps.
    ///
    /// Use 0 for unlimited training (will run until stopped).
    pub fn with_max_train_steps(mut self, steps: u64) -> Self {
        self.max_train_steps = steps;
        self
    }

    /// Validate the configuration and return any issues.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.target_update_period == 0 {
            return Err("target_update_period must be > 0");
        }
        if self.stats_freq == 0 {
            return Err("stats_freq must be > 0");
        }
        if !self.importance_sampling_exponent.is_finite() || self.importance_sampling_exponent < 0.0
        {
            return Err("importance_sampling_exponent must be finite and >= 0");
        }
        Ok(())
    }
}

/// Everything the learner checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerState<P> {
    /// Parameters being trained
    pub online: P,
    /// Frozen copy used for bootstrap targets
    pub target: P,
    /// Training steps taken
    pub steps: u64,
}

impl<P: Clone> LearnerState<P> {
    /// Fresh state with target equal to online.
    pub fn new(params: P) -> Self {
        Self {
            target: params.clone(),
            online: params,
            steps: 0,
        }
    }
}

/// Importance-sampling weights `(N·P(i))^-β`, normalized by the batch max.
///
/// Items with a non-positive or non-finite weight get 0; an all-zero batch
/// falls back to uniform weights of 1.
pub fn importance_weights<T>(items: &[SampledItem<T>], beta: f64) -> Vec<f64> {
    let mut weights: Vec<f64> = items
        .iter()
        .map(|item| {
            let w = (item.table_size as f64 * item.probability).powf(-beta);
            if w.is_finite() && w > 0.0 {
                w
            } else {
                0.0
            }
        })
        .collect();

    let max = weights.iter().copied().fold(0.0f64, f64::max);
    if max > 0.0 {
        for w in &mut weights {
            *w /= max;
        }
    } else {
        weights.iter_mut().for_each(|w| *w = 1.0);
    }
    weights
}

/// Learner handle for controlling the spawned learner thread.
pub struct LearnerHandle {
    /// Thread handle for the learner thread
    pub thread: JoinHandle<FinishReason>,
    /// Channel to receive stats from learner
    pub stats_rx: Receiver<LearnerStats>,
    /// Channel to send commands to learner
    pub cmd_tx: Sender<LearnerMsg>,
    /// Counter for dropped stats (for diagnostics)
    pub dropped_stats: Arc<AtomicUsize>,
    stop_flag: Arc<AtomicBool>,
}

impl LearnerHandle {
    /// Ask the learner to stop after its current step.
    ///
    /// Returns `true` if the command was queued.
    pub fn stop(&self) -> bool {
        self.stop_flag.store(true, Ordering::Release);
        self.cmd_tx.try_send(LearnerMsg::Stop).is_ok()
    }

    /// Get latest stats (non-blocking).
    pub fn get_stats(&self) -> Option<LearnerStats> {
        self.stats_rx.try_recv().ok()
    }

    /// Drain all available stats, oldest first.
    pub fn drain_stats(&self) -> Vec<LearnerStats> {
        self.stats_rx.try_iter().collect()
    }

    /// Request stats from the learner.
    pub fn request_stats(&self) -> bool {
        self.cmd_tx.try_send(LearnerMsg::RequestStats).is_ok()
    }

    /// Check if the learner thread is still running.
    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Get the number of stats that were dropped due to full channel.
    pub fn get_dropped_stats_count(&self) -> usize {
        self.dropped_stats.load(Ordering::Relaxed)
    }

    /// Wait for learner thread to finish.
    pub fn join(self) -> FinishReason {
        FinishReason::from_join(self.thread.join())
    }
}

/// Prioritized-replay DQN learner.
pub struct Learner<P> {
    config: LearnerConfig,
    training_step: Box<dyn TrainingStep<P>>,
    dataset: ReplayDataset<Transition>,
    slot: SharedVariableSlot<P>,
    counter: ScopedCounter,
    logger: BoxedLogger,
    checkpoint: Option<CheckpointingRunner>,
    state: LearnerState<P>,
    target: TargetUpdater,
    stats: LearnerStats,
    /// Steps taken in this run (restored steps excluded)
    session_steps: u64,
    started: Instant,
}

impl<P> Learner<P>
where
    P: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    /// Create a learner, restoring the newest checkpoint if there is one.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: LearnerConfig,
        initial_params: P,
        training_step: Box<dyn TrainingStep<P>>,
        dataset: ReplayDataset<Transition>,
        slot: SharedVariableSlot<P>,
        counter: ScopedCounter,
        logger: BoxedLogger,
        checkpoint: Option<CheckpointingRunner>,
    ) -> Self {
        if let Err(e) = config.validate() {
            panic!("Invalid LearnerConfig: {}", e);
        }

        let state = match checkpoint.as_ref().and_then(|c| c.restore::<LearnerState<P>>()) {
            Some(state) => {
                log::info!("[Learner] restored checkpoint at step {}", state.steps);
                state
            }
            None => LearnerState::new(initial_params),
        };
        let target = TargetUpdater::starting_at(config.target_update_period, state.steps);

        let mut stats = LearnerStats::new();
        stats.train_steps = state.steps;

        Self {
            config,
            training_step,
            dataset,
            slot,
            counter,
            logger,
            checkpoint,
            state,
            target,
            stats,
            session_steps: 0,
            started: Instant::now(),
        }
    }

    /// Current learner state.
    pub fn state(&self) -> &LearnerState<P> {
        &self.state
    }

    /// Current stats.
    pub fn stats(&self) -> &LearnerStats {
        &self.stats
    }

    /// Publish the current online parameters; returns the new version.
    pub fn publish(&mut self) -> u64 {
        let version = self.slot.publish(self.state.online.clone());
        self.stats.set_params_version(version);
        version
    }

    /// Run one training step.
    ///
    /// `Ok(false)` when no batch arrived within the batch timeout, `Err` when
    /// the learner must exit.
    pub fn step(&mut self) -> Result<bool, FinishReason> {
        let batch = match self.dataset.next_batch(self.config.batch_timeout) {
            Ok(batch) => batch,
            Err(ReplayError::Timeout) => return Ok(false),
            Err(ReplayError::Closed) => return Err(FinishReason::Stopped),
            Err(e) => return Err(FinishReason::Failed(format!("learner sampling: {}", e))),
        };

        let weights = importance_weights(&batch, self.config.importance_sampling_exponent);
        let output = self.training_step.step(
            &TrainingBatch {
                items: &batch,
                importance_weights: &weights,
            },
            &mut self.state.online,
            &self.state.target,
        );

        self.write_priorities(&batch, &output.priorities)?;

        self.state.steps += 1;
        self.session_steps += 1;
        if self
            .target
            .maybe_update(&self.state.online, &mut self.state.target)
        {
            self.stats.target_updates += 1;
            log::debug!("[Learner] target updated at step {}", self.state.steps);
        }

        self.publish();

        let learner_steps = match self.counter.increment(&[("steps", 1)]) {
            Ok(counts) => counts.get("steps").copied().unwrap_or(0),
            Err(e) => {
                log::warn!("[Learner] counter update failed: {}", e);
                self.state.steps
            }
        };

        let elapsed = self.started.elapsed().as_secs_f64();
        self.stats.record_step(&output.metrics);
        self.stats.train_steps = self.state.steps;
        self.stats
            .set_steps_per_second(safe_steps_per_second(self.session_steps, elapsed));
        self.stats.replay_size = self.dataset.table().len();

        let mut metrics = output.metrics;
        metrics.insert("learner_steps".to_string(), learner_steps as f64);
        metrics.insert("steps_per_second".to_string(), self.stats.steps_per_second);
        self.logger.log(self.counter.namespace(), &metrics);

        if let Some(runner) = self.checkpoint.as_mut() {
            match runner.maybe_save(&self.state) {
                Ok(Some(path)) => log::info!("[Learner] checkpoint saved to {:?}", path),
                Ok(None) => {}
                Err(e) => log::warn!("[Learner] checkpoint failed: {}", e),
            }
        }
        Ok(true)
    }

    fn write_priorities(
        &mut self,
        batch: &[SampledItem<Transition>],
        priorities: &[f64],
    ) -> Result<(), FinishReason> {
        if priorities.len() != batch.len() {
            log::warn!(
                "[Learner] got {} priorities for a batch of {}, skipping update",
                priorities.len(),
                batch.len()
            );
            self.stats.skipped_priority_updates += 1;
            return Ok(());
        }

        let keys: Vec<u64> = batch.iter().map(|item| item.key).collect();
        match self.dataset.table().update_priorities(&keys, priorities) {
            Ok(_) => Ok(()),
            Err(ReplayError::Closed) => Err(FinishReason::Stopped),
            Err(e) => {
                log::warn!("[Learner] priority update rejected: {}", e);
                self.stats.skipped_priority_updates += 1;
                Ok(())
            }
        }
    }

    /// Run until stopped. Returns why the learner finished.
    pub fn run(
        &mut self,
        stop: &AtomicBool,
        cmd_rx: &Receiver<LearnerMsg>,
        stats_tx: &Sender<LearnerStats>,
        dropped_stats: &AtomicUsize,
    ) -> FinishReason {
        let send_stats = |stats: LearnerStats| {
            if let Err(TrySendError::Full(_)) = stats_tx.try_send(stats) {
                dropped_stats.fetch_add(1, Ordering::Relaxed);
            }
        };

        let version = self.publish();
        log::info!(
            "[Learner] started at step {}, published v{}",
            self.state.steps,
            version
        );

        let reason = 'outer: loop {
            if stop.load(Ordering::Acquire) {
                break FinishReason::Stopped;
            }
            if self.config.max_train_steps > 0 && self.session_steps >= self.config.max_train_steps
            {
                break FinishReason::Completed;
            }

            while let Ok(msg) = cmd_rx.try_recv() {
                match msg {
                    LearnerMsg::Stop => break 'outer FinishReason::Stopped,
                    LearnerMsg::RequestStats => send_stats(self.stats.clone()),
                }
            }

            match self.step() {
                Ok(true) => {
                    if self.state.steps % self.config.stats_freq == 0 {
                        send_stats(self.stats.clone());
                    }
                }
                Ok(false) => {}
                Err(reason) => break reason,
            }
        };

        if let Some(runner) = self.checkpoint.as_mut() {
            if let Err(e) = runner.save(&self.state) {
                log::error!("[Learner] final checkpoint failed: {}", e);
            }
        }
        self.logger.flush();
        send_stats(self.stats.clone());
        log::info!(
            "[Learner] {} at step {} ({:.1} steps/s)",
            reason,
            self.state.steps,
            self.stats.steps_per_second
        );
        reason
    }

    /// Spawn the learner on a thread named "learner".
    pub fn spawn(mut self) -> LearnerHandle {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let dropped_stats = Arc::new(AtomicUsize::new(0));
        let (stats_tx, stats_rx) = bounded(100);
        let (cmd_tx, cmd_rx) = bounded(100);

        let thread_stop = stop_flag.clone();
        let thread_dropped = dropped_stats.clone();
        let thread = std::thread::Builder::new()
            .name("learner".to_string())
            .spawn(move || {
                self.run(&thread_stop, &cmd_rx, &stats_tx, &thread_dropped)
            })
            .expect("Failed to spawn learner thread");

        LearnerHandle {
            thread,
            stats_rx,
            cmd_tx,
            dropped_stats,
            stop_flag,
        }
    }
}
