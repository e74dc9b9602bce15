//! Evaluator: acts with a fixed small epsilon and only reports returns.
//!
//! Evaluators never write to replay. They read parameters straight from the
//! learner every step and stop after a fixed budget of environment steps,
//! cutting the running episode short when the budget ends mid-episode.

use super::actor::{epsilon_greedy, wait_for_variables, ActorHandle, ActorState};
use crate::core::TimeStep;
use crate::counter::ScopedCounter;
use crate::environment::{ActionSpec, Environment};
use crate::messages::{ActorMsg, EpisodeStats, FinishReason};
use crate::metrics::{metrics, BoxedLogger};
use crate::network::Policy;
use crate::scheduling::{ConstantEpsilon, ExplorationSchedule};
use crate::variables::{VariableClient, VariableError};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Evaluator configuration.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Evaluator ID (0 evaluates on the training distribution)
    pub evaluator_id: usize,
    /// Fixed exploration rate
    pub epsilon: f64,
    /// Total environment steps, restarts included
    pub max_actor_steps: u64,
    /// Steps between unsolicited stats reports
    pub stats_freq: u64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            evaluator_id: 0,
            epsilon: 0.0,
            max_actor_steps: 25_000_000,
            stats_freq: 10_000,
        }
    }
}

impl EvaluatorConfig {
    pub fn for_evaluator(evaluator_id: usize) -> Self {
        Self {
            evaluator_id,
            ..Default::default()
        }
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_max_actor_steps(mut self, steps: u64) -> Self {
        self.max_actor_steps = steps;
        self
    }

    /// Counter namespace holding this evaluator's counts.
    pub fn namespace(&self) -> String {
        format!("evaluator{}", self.evaluator_id)
    }
}

/// Fixed-epsilon evaluation worker.
pub struct Evaluator<P> {
    config: EvaluatorConfig,
    name: String,
    state: ActorState,
    environment: Box<dyn Environment>,
    spec: ActionSpec,
    policy: Box<dyn Policy<P>>,
    schedule: ConstantEpsilon,
    variables: VariableClient<P>,
    counter: ScopedCounter,
    logger: BoxedLogger,
    stats: EpisodeStats,
    /// Steps taken before this run, read back from the counter
    resumed_steps: u64,
    timestep: Option<TimeStep>,
    episode_return: f64,
    episode_length: u64,
    /// Environment steps not yet added to the counter
    uncounted_steps: u64,
}

impl<P: Send + Sync + 'static> Evaluator<P> {
    pub fn new(
        config: EvaluatorConfig,
        environment: Box<dyn Environment>,
        policy: Box<dyn Policy<P>>,
        variables: VariableClient<P>,
        counter: ScopedCounter,
        logger: BoxedLogger,
    ) -> Self {
        let spec = environment.action_spec();
        let mut stats = EpisodeStats::new(config.evaluator_id);
        stats.epsilon = config.epsilon;
        Self {
            name: format!("evaluator-{}", config.evaluator_id),
            state: ActorState::Init,
            schedule: ConstantEpsilon::new(config.epsilon),
            config,
            environment,
            spec,
            policy,
            variables,
            counter,
            logger,
            stats,
            resumed_steps: 0,
            timestep: None,
            episode_return: 0.0,
            episode_length: 0,
            uncounted_steps: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ActorState {
        self.state
    }

    pub fn stats(&self) -> &EpisodeStats {
        &self.stats
    }

    /// Steps counted against the budget, earlier runs included.
    pub fn total_steps(&self) -> u64 {
        self.resumed_steps + self.stats.steps
    }

    /// Fetch parameters and read back the step budget already spent.
    pub fn initialize(&mut self, stop: &AtomicBool) -> Result<(), FinishReason> {
        if self.state != ActorState::Init {
            return Ok(());
        }
        if let Err(reason) = wait_for_variables(&mut self.variables, stop, &self.name) {
            self.state = ActorState::Stopped;
            return Err(reason);
        }

        self.resumed_steps = match self.counter.get("steps") {
            Ok(steps) => steps,
            Err(e) => {
                log::warn!("[{}] cannot read step count, starting from 0: {}", self.name, e);
                0
            }
        };
        if self.resumed_steps > 0 {
            log::info!(
                "[{}] resuming at step {} of {}",
                self.name,
                self.resumed_steps,
                self.config.max_actor_steps
            );
        }
        self.state = ActorState::Running;
        Ok(())
    }

    /// One environment step. `Err(Completed)` once the budget is spent.
    pub fn step(&mut self) -> Result<(), FinishReason> {
        if self.state != ActorState::Running {
            return Err(FinishReason::Failed(format!(
                "{} stepped in state {:?}",
                self.name, self.state
            )));
        }
        if self.total_steps() >= self.config.max_actor_steps {
            return Err(FinishReason::Completed);
        }

        let observation = match self.timestep.take() {
            Some(ts) if !ts.is_last() => ts.observation,
            _ => {
                self.episode_return = 0.0;
                self.episode_length = 0;
                self.environment.reset().observation
            }
        };

        let Some(params) = self.variables.params() else {
            return Err(FinishReason::Failed(format!("{} has no parameters", self.name)));
        };
        let action = epsilon_greedy(
            self.policy.as_mut(),
            params,
            &observation,
            self.schedule.epsilon(self.stats.steps),
            &self.spec,
        );

        let next = self.environment.step(action);
        self.stats.add_steps(1);
        self.stats.params_version = self.variables.version();
        self.episode_return += next.reward as f64;
        self.episode_length += 1;
        self.uncounted_steps += 1;

        let budget_spent = self.total_steps() >= self.config.max_actor_steps;
        if next.is_last() {
            self.end_episode(next.discount > 0.0);
        } else if budget_spent {
            self.end_episode(true);
        }
        self.timestep = Some(next);

        if budget_spent {
            return Err(FinishReason::Completed);
        }
        match self.variables.update() {
            Err(VariableError::Closed) => Err(FinishReason::Stopped),
            _ => Ok(()),
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
                ("truncated", if truncated { 1.0 } else { 0.0 }),
                ("evaluator_steps", self.total_steps() as f64),
            ]),
        );
    }

    /// Add steps of the unfinished episode to the counter so a restart
    /// resumes the budget where this run left off.
    pub fn flush_steps(&mut self) {
        if self.uncounted_steps == 0 {
            return;
        }
        match self.counter.increment(&[("steps", self.uncounted_steps)]) {
            Ok(_) => self.uncounted_steps = 0,
            Err(e) => log::warn!("[{}] final step count lost: {}", self.name, e),
        }
    }

    /// Run until the budget is spent or the evaluator is stopped.
    pub fn run(
        &mut self,
        stop: &AtomicBool,
        cmd_rx: &Receiver<ActorMsg>,
        stats_tx: &Sender<EpisodeStats>,
    ) -> FinishReason {
        if let Err(reason) = self.initialize(stop) {
            return reason;
        }

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

            if let Err(reason) = self.step() {
                break reason;
            }

            if self.config.stats_freq > 0 && self.stats.steps % self.config.stats_freq == 0 {
                let _ = stats_tx.try_send(self.stats.clone());
            }
        };

        self.state = ActorState::Stopped;
        self.flush_steps();
        let _ = stats_tx.try_send(self.stats.clone());
        self.logger.flush();
        log::info!(
            "[{}] {} at step {} ({} episodes, avg return {:.3})",
            self.name,
            reason,
            self.total_steps(),
            self.stats.episodes,
            self.stats.avg_episode_return
        );
        reason
    }

    /// Spawn the evaluator on a named thread.
    pub fn spawn(mut self) -> ActorHandle {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let (stats_tx, stats_rx) = bounded(100);
        let (cmd_tx, cmd_rx) = bounded(100);

        let thread_stop = stop_flag.clone();
        let thread = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || self.run(&thread_stop, &cmd_rx, &stats_tx))
            .expect("Failed to spawn evaluator thread");

        ActorHandle::new(thread, stats_rx, cmd_tx, stop_flag)
    }
}
