//! Launcher: turns a `TopologyPlan` into running threads.
//!
//! # Shutdown order
//!
//! 1. Stop flags on the learner and every actor/evaluator
//! 2. Close the replay table (wakes blocked inserts and samples)
//! 3. Close the parameter slot (wakes caches and clients)
//! 4. Join workers, then stop and join the counter last so that final
//!    increments and its checkpoint land

use super::plan::TopologyPlan;
use crate::actors::{Actor, ActorConfig, ActorHandle, Evaluator, EvaluatorConfig};
use crate::checkpoint::{CheckpointError, Checkpointer, CheckpointingRunner};
use crate::config::{ConfigError, DistributedDqnConfig};
use crate::core::{system_clock, SharedClock, Transition};
use crate::counter::{spawn_counter, CounterClient, CounterConfig, CounterHandle};
use crate::environment::{EnvironmentFactory, EnvironmentVariant};
use crate::learner::{Learner, LearnerConfig, LearnerHandle};
use crate::messages::NodeFinished;
use crate::metrics::make_default_logger;
use crate::network::{NetworkFactory, UpdateHyperparams};
use crate::replay::{replay_table, DatasetConfig, ReplayDataset, SharedReplayTable};
use crate::variables::{
    SharedVariableSlot, SharedVariableSource, VariableCache, VariableClient, VariableSlot,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Why a program could not be launched.
#[derive(Debug)]
pub enum LaunchError {
    Config(ConfigError),
    Checkpoint(CheckpointError),
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchError::Config(e) => write!(f, "{}", e),
            LaunchError::Checkpoint(e) => write!(f, "checkpoint setup failed: {}", e),
        }
    }
}

impl std::error::Error for LaunchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LaunchError::Config(e) => Some(e),
            LaunchError::Checkpoint(e) => Some(e),
        }
    }
}

impl From<ConfigError> for LaunchError {
    fn from(e: ConfigError) -> Self {
        LaunchError::Config(e)
    }
}

impl From<CheckpointError> for LaunchError {
    fn from(e: CheckpointError) -> Self {
        LaunchError::Checkpoint(e)
    }
}

/// A configured but not yet running distributed DQN program.
pub struct Program<P> {
    config: DistributedDqnConfig,
    plan: TopologyPlan,
    environments: Arc<dyn EnvironmentFactory>,
    networks: Arc<dyn NetworkFactory<P>>,
    clock: SharedClock,
}

impl<P> Program<P>
where
    P: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    /// Validate `config` and lay out the topology.
    pub fn new(
        config: DistributedDqnConfig,
        environments: Arc<dyn EnvironmentFactory>,
        networks: Arc<dyn NetworkFactory<P>>,
    ) -> Result<Self, ConfigError> {
        let plan = TopologyPlan::build(&config)?;
        Ok(Self {
            config,
            plan,
            environments,
            networks,
            clock: system_clock(),
        })
    }

    /// Use `clock` for checkpoint intervals and cache staleness.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn plan(&self) -> &TopologyPlan {
        &self.plan
    }

    pub fn config(&self) -> &DistributedDqnConfig {
        &self.config
    }

    /// Build every collaborator and spawn every node.
    pub fn launch(self) -> Result<RunningProgram<P>, LaunchError> {
        let config = &self.config;
        let log_interval = config.log_interval();
        let csv_dir = config.csv_dir.as_deref();

        let learner_checkpoint = config
            .checkpointer_config("learner", config.learner_checkpoint_secs)
            .map(Checkpointer::new)
            .transpose()?
            .map(|c| CheckpointingRunner::new(c, self.clock.clone()));

        let mut counter_config = CounterConfig::new();
        if let Some(c) = config.checkpointer_config("counter", config.counter_checkpoint_secs) {
            counter_config = counter_config.with_checkpoint(c);
        }

        let replay = replay_table(config.table_config().with_name("priority_table"));
        let counter = spawn_counter(counter_config, self.clock.clone());
        let counter_client = counter.client();

        let spec = self.environments.action_spec();
        let slot: SharedVariableSlot<P> = Arc::new(VariableSlot::new());

        let hyperparams = UpdateHyperparams {
            learning_rate: config.learning_rate,
            discount: config.discount,
            n_step: config.n_step,
        };
        let learner = Learner::new(
            LearnerConfig::new()
                .with_importance_sampling_exponent(config.importance_sampling_exponent)
                .with_target_update_period(config.target_update_period),
            self.networks.initial_parameters(&spec),
            self.networks.make_training_step(&spec, &hyperparams),
            ReplayDataset::new(
                replay.clone(),
                DatasetConfig::new(config.batch_size, config.prefetch_size),
            ),
            slot.clone(),
            counter_client.scoped("learner"),
            make_default_logger("learner", log_interval, csv_dir),
            learner_checkpoint,
        )
        .spawn();

        let caches: Vec<Arc<VariableCache<P>>> = (0..self.plan.num_caches)
            .map(|i| {
                Arc::new(VariableCache::new(
                    format!("cache-{}", i),
                    slot.clone(),
                    self.clock.clone(),
                    config.cache_config(),
                ))
            })
            .collect();

        let actors = self
            .plan
            .actors
            .iter()
            .map(|node| {
                let name = format!("actor-{}", node.actor_id);
                let source: SharedVariableSource<P> = caches[node.cache].clone();
                Actor::new(
                    ActorConfig::for_actor(node.actor_id)
                        .with_epsilon(node.epsilon)
                        .with_epsilon_decay_steps(config.epsilon_decay_steps)
                        .with_n_step(config.n_step, config.discount)
                        .with_default_priority(config.default_priority),
                    self.environments
                        .make_environment(EnvironmentVariant::TrainingDistribution),
                    self.networks.make_policy(&spec),
                    VariableClient::new(&name, source, config.variable_update_period),
                    replay.clone(),
                    counter_client.scoped("actor"),
                    make_default_logger(&name, log_interval, csv_dir),
                )
                .spawn()
            })
            .collect();

        let evaluators = self
            .plan
            .evaluators
            .iter()
            .map(|node| {
                let evaluator_config = EvaluatorConfig::for_evaluator(node.evaluator_id)
                    .with_epsilon(node.epsilon)
                    .with_max_actor_steps(config.max_actor_steps);
                let namespace = evaluator_config.namespace();
                let source: SharedVariableSource<P> = slot.clone();
                Evaluator::new(
                    evaluator_config,
                    self.environments.make_environment(node.variant),
                    self.networks.make_policy(&spec),
                    VariableClient::new(&namespace, source, 1),
                    counter_client.scoped(namespace.clone()),
                    make_default_logger(&namespace, log_interval, csv_dir),
                )
                .spawn()
            })
            .collect();

        log::info!(
            "[Program] launched {} actors over {} caches, {} evaluators",
            self.plan.actors.len(),
            self.plan.num_caches,
            self.plan.evaluators.len()
        );

        Ok(RunningProgram {
            plan: self.plan,
            replay,
            slot,
            caches,
            counter: Some(counter),
            learner: Some(learner),
            actors,
            evaluators,
        })
    }
}

/// Handles to every node of a launched program.
pub struct RunningProgram<P> {
    plan: TopologyPlan,
    replay: SharedReplayTable<Transition>,
    slot: SharedVariableSlot<P>,
    caches: Vec<Arc<VariableCache<P>>>,
    counter: Option<CounterHandle>,
    learner: Option<LearnerHandle>,
    actors: Vec<ActorHandle>,
    evaluators: Vec<ActorHandle>,
}

impl<P> RunningProgram<P> {
    pub fn plan(&self) -> &TopologyPlan {
        &self.plan
    }

    /// The replay table.
    pub fn replay(&self) -> &SharedReplayTable<Transition> {
        &self.replay
    }

    /// The learner's parameter slot.
    pub fn variables(&self) -> &SharedVariableSlot<P> {
        &self.slot
    }

    /// The variable caches, by index.
    pub fn caches(&self) -> &[Arc<VariableCache<P>>] {
        &self.caches
    }

    /// A client of the counter service, if it is still running.
    pub fn counter(&self) -> Option<CounterClient> {
        self.counter.as_ref().map(|c| c.client())
    }

    pub fn learner(&self) -> Option<&LearnerHandle> {
        self.learner.as_ref()
    }

    pub fn actors(&self) -> &[ActorHandle] {
        &self.actors
    }

    pub fn evaluators(&self) -> &[ActorHandle] {
        &self.evaluators
    }

    /// Whether every evaluator has used up its step budget or exited.
    pub fn evaluators_finished(&self) -> bool {
        self.evaluators.iter().all(|e| !e.is_running())
    }

    /// Signal every node to stop. Does not wait.
    pub fn stop(&self) {
        log::info!("[Program] stopping");
        if let Some(learner) = &self.learner {
            learner.stop();
        }
        for worker in self.actors.iter().chain(self.evaluators.iter()) {
            worker.stop();
        }
        self.replay.close();
        self.slot.close();
    }

    /// Wait for every node. Call `stop` first unless the nodes end on
    /// their own.
    pub fn join(mut self) -> Vec<NodeFinished> {
        let mut finished = Vec::new();

        if let Some(learner) = self.learner.take() {
            finished.push(NodeFinished {
                node: "learner".to_string(),
                reason: learner.join(),
            });
        }
        for (i, actor) in self.actors.drain(..).enumerate() {
            finished.push(NodeFinished {
                node: format!("actor-{}", i),
                reason: actor.join(),
            });
        }
        for (i, evaluator) in self.evaluators.drain(..).enumerate() {
            finished.push(NodeFinished {
                node: format!("evaluator-{}", i),
                reason: evaluator.join(),
            });
        }
        if let Some(counter) = self.counter.take() {
            counter.stop();
            finished.push(NodeFinished {
                node: "counter".to_string(),
                reason: counter.join(),
            });
        }

        for node in finished.iter().filter(|n| !n.reason.is_clean()) {
            log::error!("[Program] {} {}", node.node, node.reason);
        }
        finished
    }

    /// Stop everything and wait.
    pub fn shutdown(self) -> Vec<NodeFinished> {
        self.stop();
        self.join()
    }

    /// Wait for the evaluators to spend their budgets, then shut down.
    pub fn run_until_evaluators_finish(self) -> Vec<NodeFinished> {
        while !self.evaluators_finished() {
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        self.shutdown()
    }
}

impl<P> Drop for RunningProgram<P> {
    fn drop(&mut self) {
        if self.learner.is_some() || !self.actors.is_empty() || self.counter.is_some() {
            // Dropped without join: make sure nothing keeps running.
            if let Some(learner) = &self.learner {
                learner.stop();
            }
            for worker in self.actors.iter().chain(self.evaluators.iter()) {
                worker.stop();
            }
            self.replay.close();
            self.slot.close();
            if let Some(counter) = &self.counter {
                counter.stop();
            }
        }
    }
}
