//! Actor: acts epsilon-greedily, feeds n-step transitions into replay.
//!
//! Actors run in their own thread and:
//! 1. Block until a first parameter snapshot is available
//! 2. Step their environment with epsilon-greedy actions
//! 3. Insert completed n-step transitions with the default priority
//! 4. Ask their variable client for fresher parameters every step
//!
//! ```text
//!   Init ──first snapshot──► Running ──stop / replay closed──► Stopped
//! ```

use super::adder::NStepAdder;
use crate::core::{TimeStep, Transition};
use crate::counter::ScopedCounter;
use crate::environment::{ActionSpec, Environment};
use crate::messages::{ActorMsg, EpisodeStats, FinishReason};
use crate::metrics::{metrics, BoxedLogger};
use crate::network::Policy;
use crate::replay::{ReplayError, SharedReplayTable};
use crate::scheduling::{ExplorationSchedule, LinearDecayEpsilon};
use crate::variables::{VariableClient, VariableError};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Pause between failed initial parameter fetches.
const INIT_RETRY: Duration = Duration::from_millis(10);

/// Actor configuration.
#[derive(Debug, Clone)]
pub struct ActorConfig {
    /// Actor ID (for logging and thread naming)
    pub actor_id: usize,
    /// Epsilon reached at the end of the anneal
    pub epsilon: f64,
    /// Steps over which epsilon anneals from 1.0
    pub epsilon_decay_steps: u64,
    /// Steps folded into each transition
    pub n_step: usize,
    /// Per-step discount
    pub discount: f64,
    /// Priority of freshly inserted transitions
    pub default_priority: f64,
    /// How long one blocked insert waits before rechecking the stop flag
    pub insert_timeout: Duration,
    /// Steps between unsolicited stats reports
    pub stats_freq: u64,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            actor_id: 0,
            epsilon: 0.01,
            epsilon_decay_steps: 250_000,
            n_step: 5,
            discount: 0.99,
            default_priority: 4.0,
            insert_timeout: Duration::from_millis(100),
            stats_freq: 10_000,
        }
    }
}

impl ActorConfig {
    /// Create config for a specific actor ID.
    pub fn for_actor(actor_id: usize) -> Self {
        Self {
            actor_id,
            ..Default::default()
        }
    }

    /// Set the final epsilon.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Set the anneal length.
    pub fn with_epsilon_decay_steps(mut self, steps: u64) -> Self {
        self.epsilon_decay_steps = steps;
        self
    }

    /// Set the n-step horizon and discount.
    pub fn with_n_step(mut self, n_step: usize, discount: f64) -> Self {
        self.n_step = n_step;
        self.discount = discount;
        self
    }

    /// Set the insertion priority.
    pub fn with_default_priority(mut self, priority: f64) -> Self {
        self.default_priority = priority;
        self
    }

    /// Set stats reporting frequency.
    pub fn with_stats_freq(mut self, freq: u64) -> Self {
        self.stats_freq = freq;
        self
    }

    /// The Atari-style schedule for this actor.
    pub fn schedule(&self) -> LinearDecayEpsilon {
        LinearDecayEpsilon::atari(self.epsilon, self.epsilon_decay_steps)
    }
}

/// Lifecycle of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    /// Waiting for the first parameter snapshot.
    Init,
    /// Acting.
    Running,
    /// Finished; never restarts.
    Stopped,
}

/// Handle for a spawned actor or evaluator thread.
pub struct ActorHandle {
    /// Thread handle
    pub thread: JoinHandle<FinishReason>,
    /// Channel to receive stats from the worker
    pub stats_rx: Receiver<EpisodeStats>,
    /// Channel to send commands to the worker
    pub cmd_tx: Sender<ActorMsg>,
    stop_flag: Arc<AtomicBool>,
}

impl ActorHandle {
    pub(crate) fn new(
        thread: JoinHandle<FinishReason>,
        stats_rx: Receiver<EpisodeStats>,
        cmd_tx: Sender<ActorMsg>,
        stop_flag: Arc<AtomicBool>,
    ) -> Self {
        Self {
            thread,
            stats_rx,
            cmd_tx,
            stop_flag,
        }
    }

    /// Ask the worker to stop. Also interrupts a blocked replay insert.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        let _ = self.cmd_tx.try_send(ActorMsg::Stop);
    }

    /// Request a stats report.
    pub fn request_stats(&self) -> bool {
        self.cmd_tx.try_send(ActorMsg::RequestStats).is_ok()
    }

    /// Get latest stats (non-blocking).
    pub fn get_stats(&self) -> Option<EpisodeStats> {
        self.stats_rx.try_recv().ok()
    }

    /// Drain all buffered stats, oldest first.
    pub fn drain_stats(&self) -> Vec<EpisodeStats> {
        self.stats_rx.try_iter().collect()
    }

    /// Check if the worker thread is still running.
    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Wait for the worker thread to finish.
    pub fn join(self) -> FinishReason {
        FinishReason::from_join(self.thread.join())
    }
}

/// Epsilon-greedy action: uniform with probability `epsilon`, else greedy.
pub(crate) fn epsilon_greedy<P>(
    policy: &mut dyn Policy<P>,
    params: &P,
    observation: &[f32],
    epsilon: f64,
    spec: &ActionSpec,
) -> u32 {
    if epsilon > 0.0 && fastrand::f64() < epsilon {
        spec.sample()
    } else {
        policy.select_action(params, observation)
    }
}

/// Block on the first parameter fetch, retrying until `stop` is raised.
pub(crate) fn wait_for_variables<P>(
    client: &mut VariableClient<P>,
    stop: &AtomicBool,
    name: &str,
) -> Result<(), FinishReason> {
    let mut attempts = 0usize;
    loop {
        if stop.load(Ordering::Acquire) {
            return Err(FinishReason::Stopped);
        }
        match client.update_and_wait() {
            Ok(()) => {
                log::info!(
                    "[{}] received parameters v{} after {} retries",
                    name,
                    client.version(),
                    attempts
                );
                return Ok(());
            }
            Err(VariableError::Closed) => return Err(FinishReason::Stopped),
            Err(e) => {
                attempts += 1;
                if attempts == 1 {
                    log::debug!("[{}] waiting for parameters: {}", name, e);
                }
                std::thread::sleep(INIT_RETRY);
            }
        }
    }
}

/// Epsilon-greedy actor writing n-step transitions into a replay table.
pub struct Actor<P> {
    config: ActorConfig,
    name: String,
    state: ActorState,
    environment: Box<dyn Environment>,
    spec: ActionSpec,
    policy: Box<dyn Policy<P>>,
    variables: VariableClient<P>,
    replay: SharedReplayTable<Transition>,
    counter: ScopedCounter,
    schedule: Box<dyn ExplorationSchedule>,
    adder: NStepAdder,
    logger: BoxedLogger,
    stats: EpisodeStats,
    timestep: Option<TimeStep>,
    episode_return: f64,
    episode_length: u64,
    /// Environment steps not yet added to the shared counter
    uncounted_steps: u64,
}

impl<P: Send + Sync + 'static> Actor<P> {
    /// Create an actor. The exploration schedule comes from the config.
    pub fn new(
        config: ActorConfig,
        environment: Box<dyn Environment>,
        policy: Box<dyn Policy<P>>,
        variables: VariableClient<P>,
        replay: SharedReplayTable<Transition>,
        counter: ScopedCounter,
        logger: BoxedLogger,
    ) -> Self {
        let spec = environment.action_spec();
        let schedule = Box::new(config.schedule());
        let adder = NStepAdder::new(config.n_step, config.discount as f32);
        Self {
            name: format!("actor-{}", config.actor_id),
            state: ActorState::Init,
            stats: EpisodeStats::new(config.actor_id),
            config,
            environment,
            spec,
            policy,
            variables,
            replay,
            counter,
            schedule,
            adder,
            logger,
            timestep: None,
            episode_return: 0.0,
            episode_length: 0,
            uncounted_steps: 0,
        }
    }

    /// Replace the exploration schedule.
    pub fn with_schedule(mut self, schedule: Box<dyn ExplorationSchedule>) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ActorState {
        self.state
    }

    /// Stats accumulated so far.
    pub fn stats(&self) -> &EpisodeStats {
        &self.stats
    }

    /// Leave `Init` once parameters are available.
    pub fn initialize(&mut self, stop: &AtomicBool) -> Result<(), FinishReason> {
        if self.state != ActorState::Init {
            return Ok(());
        }
        match wait_for_variables(&mut self.variables, stop, &self.name) {
            Ok(()) => {
                self.state = ActorState::Running;
                Ok(())
            }
            Err(reason) => {
                self.state = ActorState::Stopped;
                Err(reason)
            }
        }
    }

    /// One environment step. `Err` carries the reason the actor must exit.
    pub fn step(&mut self, stop: &AtomicBool) -> Result<(), FinishReason> {
        if self.state != ActorState::Running {
            return Err(FinishReason::Failed(format!(
                "{} stepped in state {:?}",
                self.name, self.state
            )));
        }

        let observation = match self.timestep.take() {
            Some(ts) if !ts.is_last() => ts.observation,
            _ => {
                let first = self.environment.reset();
                self.adder.add_first(&first);
                self.episode_return = 0.0;
                self.episode_length = 0;
                first.observation
            }
        };

        let epsilon = self.schedule.epsilon(self.stats.steps);
        let Some(params) = self.variables.params() else {
            return Err(FinishReason::Failed(format!("{} has no parameters", self.name)));
        };
        let action = epsilon_greedy(
            self.policy.as_mut(),
            params,
            &observation,
            epsilon,
            &self.spec,
        );

        let next = self.environment.step(action);
        self.stats.add_steps(1);
        self.stats.epsilon = epsilon;
        self.stats.params_version = self.variables.version();
        self.episode_return += next.reward as f64;
        self.episode_length += 1;
        self.uncounted_steps += 1;

        for transition in self.adder.add(action, &next) {
            self.insert(transition, stop)?;
        }

        if next.is_last() {
            self.end_episode(next.discount > 0.0);
        }
        self.timestep = Some(next);

        match self.variables.update() {
            Err(VariableError::Closed) => Err(FinishReason::Stopped),
            _ => Ok(()),
        }
    }

    fn insert(&mut self, transition: Transition, stop: &AtomicBool) -> Result<(), FinishReason> {
        let item = Arc::new(transition);
        loop {
            if stop.load(Ordering::Acquire) {
                return Err(FinishReason::Stopped);
            }
            match self.replay.insert_timeout(
                item.clone(),
                self.config.default_priority,
                self.config.insert_timeout,
            ) {
                Ok(_) => return Ok(()),
                Err(ReplayError::Timeout) => continue,
                Err(ReplayError::Closed) => return Err(FinishReason::Stopped),
                Err(e) => return Err(FinishReason::Failed(format!("{}: {}", self.name, e))),
            }
        }
    }

    fn end_episode(&mut self, truncated: bool) {
        self.stats
            .record_episode(self.episode_return, self.episode_length, truncated);

        if let Err(e) = self.counter.increment(&[
            ("steps", self.uncounted_steps),
            ("episodes", 1),
        ]) {
            log::warn!("[{}] counter update failed: {}", self.name, e);
        }
        self.uncounted_steps = 0;

        self.logger.log(
            self.counter.namespace(),
            &metrics([
                ("episode_return", self.episode_return),
                ("episode_length", self.episode_length as f64),
                ("epsilon", self.stats.epsilon),
                ("actor_steps", self.stats.steps as f64),
            ]),
        );
    }

    /// Add steps of the unfinished episode to the shared counter.
    pub fn flush_steps(&mut self) {
        if self.uncounted_steps == 0 {
            return;
        }
        match self.counter.increment(&[("steps", self.uncounted_steps)]) {
            Ok(_) => self.uncounted_steps = 0,
            Err(e) => log::warn!("[{}] final step count lost: {}", self.name, e),
        }
    }

    /// Run until stopped. Returns why the actor finished.
    pub fn run(
        &mut self,
        stop: &AtomicBool,
        cmd_rx: &Receiver<ActorMsg>,
        stats_tx: &Sender<EpisodeStats>,
    ) -> FinishReason {
        if let Err(reason) = self.initialize(stop) {
            return reason;
        }
        log::info!(
            "[{}] running with epsilon {:.5}",
            self.name,
            self.config.epsilon
        );

        let reason = loop {
            if stop.load(Ordering::Acquire) {
                break FinishReason::Stopped;
            }
            match cmd_rx.try_recv() {
                Ok(ActorMsg::Stop) => break FinishReason::Stopped,
                Ok(ActorMsg::RequestStats) => {
                    let _ = stats_tx.try_send(self.stats.clone());
                }
                Err(_) => {}
            }

            if let Err(reason) = self.step(stop) {
                break reason;
            }

            if self.config.stats_freq > 0 && self.stats.steps % self.config.stats_freq == 0 {
                let _ = stats_tx.try_send(self.stats.clone());
            }
        };

        self.state = ActorState::Stopped;
        self.flush_steps();
        self.logger.flush();
        log::info!(
            "[{}] {} after {} steps, {} episodes",
            self.name,
            reason,
            self.stats.steps,
            self.stats.episodes
        );
        reason
    }

    /// Spawn the actor on a named thread.
    pub fn spawn(mut self) -> ActorHandle {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let (stats_tx, stats_rx) = bounded(100);
        let (cmd_tx, cmd_rx) = bounded(100);

        let thread_stop = stop_flag.clone();
        let thread = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || self.run(&thread_stop, &cmd_rx, &stats_tx))
            .expect("Failed to spawn actor thread");

        ActorHandle::new(thread, stats_rx, cmd_tx, stop_flag)
    }
}
