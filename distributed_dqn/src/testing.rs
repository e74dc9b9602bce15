//! Mock collaborators shared by the test suites.
//!
//! - `ChainEnvironment`: fixed-length episodes, reward 1 per step
//! - `greedy_policy`: argmax over a parameter vector
//! - `CountingTrainingStep`: bumps `params[0]` and records what it saw

use crate::core::TimeStep;
use crate::environment::{ActionSpec, Environment, EnvironmentFactory, EnvironmentVariant};
use crate::metrics::metrics;
use crate::network::{
    NetworkFactory, Policy, StepOutput, TrainingBatch, TrainingStep, UpdateHyperparams,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Parameters used throughout the tests.
pub(crate) type TestParams = Vec<f32>;

/// Environment whose episodes last exactly `episode_length` steps.
pub(crate) struct ChainEnvironment {
    episode_length: u64,
    position: u64,
    num_actions: u32,
    truncate: bool,
    total_steps: Arc<AtomicU64>,
}

impl ChainEnvironment {
    pub(crate) fn new(episode_length: u64) -> Self {
        Self {
            episode_length,
            position: 0,
            num_actions: 2,
            truncate: false,
            total_steps: Arc::new(AtomicU64::new(0)),
        }
    }

    /// End episodes with a truncation instead of a termination.
    pub(crate) fn truncating(mut self) -> Self {
        self.truncate = true;
        self
    }

    /// Shared count of `step` calls.
    pub(crate) fn step_counter(&self) -> Arc<AtomicU64> {
        self.total_steps.clone()
    }
}

impl Environment for ChainEnvironment {
    fn reset(&mut self) -> TimeStep {
        self.position = 0;
        TimeStep::first(vec![0.0])
    }

    fn step(&mut self, _action: u32) -> TimeStep {
        self.total_steps.fetch_add(1, Ordering::SeqCst);
        self.position += 1;
        let observation = vec![self.position as f32];
        if self.position >= self.episode_length {
            if self.truncate {
                TimeStep::truncation(observation, 1.0)
            } else {
                TimeStep::termination(observation, 1.0)
            }
        } else {
            TimeStep::mid(observation, 1.0)
        }
    }

    fn action_spec(&self) -> ActionSpec {
        ActionSpec::new(self.num_actions)
    }
}

/// Factory recording which variants were requested.
pub(crate) struct ChainFactory {
    episode_length: u64,
    pub(crate) variants: Mutex<Vec<EnvironmentVariant>>,
}

impl ChainFactory {
    pub(crate) fn new(episode_length: u64) -> Self {
        Self {
            episode_length,
            variants: Mutex::new(Vec::new()),
        }
    }
}

impl EnvironmentFactory for ChainFactory {
    fn make_environment(&self, variant: EnvironmentVariant) -> Box<dyn Environment> {
        self.variants.lock().push(variant);
        Box::new(ChainEnvironment::new(self.episode_length))
    }

    fn action_spec(&self) -> ActionSpec {
        ActionSpec::new(2)
    }
}

/// Argmax over the parameter vector (ties go to the lowest index).
pub(crate) fn greedy_policy() -> Box<dyn Policy<TestParams>> {
    Box::new(|params: &TestParams, _obs: &[f32]| -> u32 {
        let mut best = 0usize;
        for (i, v) in params.iter().enumerate() {
            if *v > params[best] {
                best = i;
            }
        }
        best as u32
    })
}

/// What a `CountingTrainingStep` observed.
#[derive(Debug, Default)]
pub(crate) struct TrainingLog {
    pub(crate) batch_sizes: Vec<usize>,
    pub(crate) importance_weights: Vec<Vec<f64>>,
    pub(crate) target_values: Vec<f32>,
}

/// Update rule that adds 1 to `params[0]` per step.
pub(crate) struct CountingTrainingStep {
    steps: u64,
    /// Return one priority fewer than the batch size
    short_priorities: bool,
    pub(crate) log: Arc<Mutex<TrainingLog>>,
}

impl CountingTrainingStep {
    pub(crate) fn new() -> Self {
        Self {
            steps: 0,
            short_priorities: false,
            log: Arc::new(Mutex::new(TrainingLog::default())),
        }
    }

    pub(crate) fn with_short_priorities(mut self) -> Self {
        self.short_priorities = true;
        self
    }
}

impl TrainingStep<TestParams> for CountingTrainingStep {
    fn step(
        &mut self,
        batch: &TrainingBatch<'_>,
        online: &mut TestParams,
        target: &TestParams,
    ) -> StepOutput {
        self.steps += 1;
        if let Some(first) = online.first_mut() {
            *first += 1.0;
        }

        let mut log = self.log.lock();
        log.batch_sizes.push(batch.len());
        log.importance_weights.push(batch.importance_weights.to_vec());
        log.target_values.push(target.first().copied().unwrap_or(0.0));

        let n = if self.short_priorities {
            batch.len().saturating_sub(1)
        } else {
            batch.len()
        };
        StepOutput {
            priorities: vec![self.steps as f64; n],
            metrics: metrics([("loss", 1.0 / self.steps as f64)]),
        }
    }
}

/// Network factory over `TestParams`.
pub(crate) struct TestNetworkFactory {
    pub(crate) training_log: Arc<Mutex<TrainingLog>>,
}

impl TestNetworkFactory {
    pub(crate) fn new() -> Self {
        Self {
            training_log: Arc::new(Mutex::new(TrainingLog::default())),
        }
    }
}

impl NetworkFactory<TestParams> for TestNetworkFactory {
    fn initial_parameters(&self, spec: &ActionSpec) -> TestParams {
        vec![0.0; spec.num_actions as usize]
    }

    fn make_policy(&self, _spec: &ActionSpec) -> Box<dyn Policy<TestParams>> {
        greedy_policy()
    }

    fn make_training_step(
        &self,
        _spec: &ActionSpec,
        _hyperparams: &UpdateHyperparams,
    ) -> Box<dyn TrainingStep<TestParams>> {
        let mut step = CountingTrainingStep::new();
        step.log = self.training_log.clone();
        Box::new(step)
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` ends.
pub(crate) fn wait_until(timeout: std::time::Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    condition()
}
