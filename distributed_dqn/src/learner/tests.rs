//! Tests for the learner.

use super::*;
use crate::checkpoint::{Checkpointer, CheckpointerConfig, CheckpointingRunner};
use crate::core::{system_clock, Transition};
use crate::counter::{spawn_counter, CounterConfig, CounterHandle};
use crate::messages::FinishReason;
use crate::metrics::{MemoryLogger, NullLogger};
use crate::replay::{
    replay_table, DatasetConfig, RateLimiter, ReplayDataset, SampledItem, SharedReplayTable,
    TableConfig,
};
use crate::testing::{wait_until, CountingTrainingStep, TestParams, TrainingLog};
use crate::variables::{SharedVariableSlot, VariableSlot};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn filled_replay(n: usize) -> SharedReplayTable<Transition> {
    let table = replay_table(TableConfig::new(1_000, RateLimiter::min_size(1)).with_seed(11));
    for i in 0..n {
        table
            .insert(Transition::new(vec![i as f32], 0, 1.0, 0.99, vec![i as f32 + 1.0]), 4.0)
            .unwrap();
    }
    table
}

struct Fixture {
    replay: SharedReplayTable<Transition>,
    slot: SharedVariableSlot<TestParams>,
    counter: CounterHandle,
    log: Arc<Mutex<TrainingLog>>,
}

impl Fixture {
    fn new(items: usize) -> Self {
        Self {
            replay: filled_replay(items),
            slot: Arc::new(VariableSlot::new()),
            counter: spawn_counter(CounterConfig::new(), system_clock()),
            log: Arc::new(Mutex::new(TrainingLog::default())),
        }
    }

    fn learner(
        &self,
        config: LearnerConfig,
        training_step: CountingTrainingStep,
        checkpoint_dir: Option<&Path>,
    ) -> Learner<TestParams> {
        let mut training_step = training_step;
        training_step.log = self.log.clone();
        let checkpoint = checkpoint_dir.map(|dir| {
            let config = CheckpointerConfig::new(dir).with_time_delta(Duration::ZERO);
            CheckpointingRunner::new(Checkpointer::new(config).unwrap(), system_clock())
        });
        Learner::new(
            config,
            vec![0.0, 0.0],
            Box::new(training_step),
            ReplayDataset::new(self.replay.clone(), DatasetConfig::new(4, 2)),
            self.slot.clone(),
            self.counter.client().scoped("learner"),
            Box::new(NullLogger),
            checkpoint,
        )
    }

    fn shutdown(self) {
        self.replay.close();
        self.counter.stop();
        self.counter.join();
    }
}

/// Step until one training step happened.
fn train_once(learner: &mut Learner<TestParams>) {
    for _ in 0..100 {
        if learner.step().unwrap() {
            return;
        }
    }
    panic!("no batch arrived");
}

// =============================================================================
// IMPORTANCE WEIGHTS
// =============================================================================

fn sampled(probability: f64, table_size: usize) -> SampledItem<u32> {
    SampledItem {
        key: 0,
        item: Arc::new(0),
        priority: 1.0,
        probability,
        table_size,
    }
}

#[test]
fn test_importance_weights_normalized_by_max() {
    let items = vec![sampled(0.5, 4), sampled(0.25, 4), sampled(0.25, 4)];
    let weights = importance_weights(&items, 1.0);
    // (4 * 0.5)^-1 = 0.5, (4 * 0.25)^-1 = 1
    assert!((weights[0] - 0.5).abs() < 1e-12);
    assert!((weights[1] - 1.0).abs() < 1e-12);
    assert!((weights[2] - 1.0).abs() < 1e-12);
}

#[test]
fn test_importance_weights_zero_beta_is_uniform() {
    let items = vec![sampled(0.9, 10), sampled(0.01, 10)];
    assert_eq!(importance_weights(&items, 0.0), vec![1.0, 1.0]);
}

#[test]
fn test_importance_weights_zero_probability() {
    // A zero probability gives an infinite weight, which is dropped.
    let items = vec![sampled(0.0, 10), sampled(0.1, 10)];
    let weights = importance_weights(&items, 0.5);
    assert_eq!(weights, vec![0.0, 1.0]);
}

// =============================================================================
// TRAINING STEP
// =============================================================================

#[test]
fn test_step_trains_publishes_and_counts() {
    let fixture = Fixture::new(20);
    let mut learner = fixture.learner(LearnerConfig::new(), CountingTrainingStep::new(), None);

    train_once(&mut learner);

    assert_eq!(learner.state().steps, 1);
    assert_eq!(learner.state().online, vec![1.0, 0.0]);
    assert_eq!(fixture.slot.version(), 1);
    assert_eq!(fixture.slot.latest().unwrap().params(), &vec![1.0, 0.0]);
    assert_eq!(
        fixture.counter.client().get_counts("learner").unwrap()["steps"],
        1
    );

    let log = fixture.log.lock();
    assert_eq!(log.batch_sizes, vec![4]);
    let weights = &log.importance_weights[0];
    assert_eq!(weights.len(), 4);
    assert!(weights.iter().all(|w| *w > 0.0 && *w <= 1.0));
    assert!(weights.iter().any(|w| (*w - 1.0).abs() < 1e-12));
    drop(log);

    drop(learner);
    fixture.shutdown();
}

#[test]
fn test_priorities_written_back_by_key() {
    let fixture = Fixture::new(20);
    let mut learner = fixture.learner(LearnerConfig::new(), CountingTrainingStep::new(), None);

    train_once(&mut learner);

    // The counting step returns priority 1.0 for every item of its first batch.
    let updated = (0..20u64)
        .filter(|k| fixture.replay.priority(*k) == Some(1.0))
        .count();
    assert!(updated >= 1 && updated <= 4, "updated {}", updated);
    assert_eq!(learner.stats().skipped_priority_updates, 0);

    drop(learner);
    fixture.shutdown();
}

#[test]
fn test_mismatched_priorities_are_skipped() {
    let fixture = Fixture::new(20);
    let mut learner = fixture.learner(
        LearnerConfig::new(),
        CountingTrainingStep::new().with_short_priorities(),
        None,
    );

    train_once(&mut learner);

    assert_eq!(learner.stats().skipped_priority_updates, 1);
    assert!((0..20u64).all(|k| fixture.replay.priority(k) == Some(4.0)));
    // The step itself still counts.
    assert_eq!(learner.state().steps, 1);

    drop(learner);
    fixture.shutdown();
}

#[test]
fn test_target_copied_every_period() {
    let fixture = Fixture::new(20);
    let config = LearnerConfig::new().with_target_update_period(2);
    let mut learner = fixture.learner(config, CountingTrainingStep::new(), None);

    train_once(&mut learner);
    assert_eq!(learner.state().target, vec![0.0, 0.0]);
    train_once(&mut learner);
    assert_eq!(learner.state().target, vec![2.0, 0.0]);
    train_once(&mut learner);
    assert_eq!(learner.state().target, vec![2.0, 0.0]);
    assert_eq!(learner.stats().target_updates, 1);

    // The update rule saw the frozen target at each step.
    assert_eq!(fixture.log.lock().target_values, vec![0.0, 0.0, 2.0]);

    drop(learner);
    fixture.shutdown();
}

#[test]
fn test_metrics_logged_under_learner_namespace() {
    let fixture = Fixture::new(20);
    let logger = MemoryLogger::new();
    let mut training_step = CountingTrainingStep::new();
    training_step.log = fixture.log.clone();
    let mut learner = Learner::new(
        LearnerConfig::new(),
        vec![0.0, 0.0],
        Box::new(training_step),
        ReplayDataset::new(fixture.replay.clone(), DatasetConfig::new(4, 2)),
        fixture.slot.clone(),
        fixture.counter.client().scoped("learner"),
        Box::new(logger.clone()),
        None,
    );

    train_once(&mut learner);
    train_once(&mut learner);

    let records = logger.records_for("learner");
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["learner_steps"], 2.0);
    assert_eq!(records[1]["loss"], 0.5);

    drop(learner);
    fixture.shutdown();
}

// =============================================================================
// CHECKPOINTING
// =============================================================================

#[test]
fn test_restores_latest_checkpoint() {
    let dir = tempdir().unwrap();
    let fixture = Fixture::new(20);

    let mut learner = fixture.learner(
        LearnerConfig::new().with_target_update_period(2),
        CountingTrainingStep::new(),
        Some(dir.path()),
    );
    for _ in 0..3 {
        train_once(&mut learner);
    }
    drop(learner);

    let restored = fixture.learner(
        LearnerConfig::new().with_target_update_period(2),
        CountingTrainingStep::new(),
        Some(dir.path()),
    );
    assert_eq!(restored.state().steps, 3);
    assert_eq!(restored.state().online, vec![3.0, 0.0]);
    assert_eq!(restored.state().target, vec![2.0, 0.0]);
    assert_eq!(restored.stats().train_steps, 3);

    drop(restored);
    fixture.shutdown();
}

#[test]
fn test_fresh_start_without_checkpoints() {
    let dir = tempdir().unwrap();
    let fixture = Fixture::new(0);
    let learner = fixture.learner(LearnerConfig::new(), CountingTrainingStep::new(), Some(dir.path()));

    assert_eq!(learner.state(), &LearnerState::new(vec![0.0, 0.0]));

    drop(learner);
    fixture.shutdown();
}

// =============================================================================
// SPAWNED LEARNER
// =============================================================================

#[test]
fn test_spawned_learner_publishes_until_stopped() {
    let dir = tempdir().unwrap();
    let fixture = Fixture::new(50);
    let handle = fixture
        .learner(LearnerConfig::new(), CountingTrainingStep::new(), Some(dir.path()))
        .spawn();

    assert!(wait_until(Duration::from_secs(5), || fixture.slot.version() >= 5));
    assert!(handle.stop());
    assert_eq!(handle.join(), FinishReason::Stopped);

    // Final checkpoint matches what was last published.
    let checkpointer = Checkpointer::new(CheckpointerConfig::new(dir.path())).unwrap();
    let (state, _): (LearnerState<TestParams>, _) = checkpointer.load_latest().unwrap();
    assert_eq!(&state.online, fixture.slot.latest().unwrap().params());

    fixture.shutdown();
}

#[test]
fn test_learner_waits_for_data() {
    let fixture = Fixture::new(0);
    let handle = fixture
        .learner(LearnerConfig::new(), CountingTrainingStep::new(), None)
        .spawn();

    // Initial parameters are published before any batch arrives.
    assert!(wait_until(Duration::from_secs(5), || fixture.slot.version() == 1));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(fixture.slot.version(), 1);
    assert!(handle.is_running());

    for i in 0..8 {
        fixture
            .replay
            .insert(Transition::new(vec![i as f32], 0, 0.0, 0.0, vec![0.0]), 1.0)
            .unwrap();
    }
    assert!(wait_until(Duration::from_secs(5), || fixture.slot.version() > 1));

    handle.stop();
    handle.join();
    fixture.shutdown();
}

#[test]
fn test_replay_close_stops_learner() {
    let fixture = Fixture::new(0);
    let handle = fixture
        .learner(LearnerConfig::new(), CountingTrainingStep::new(), None)
        .spawn();

    assert!(wait_until(Duration::from_secs(5), || fixture.slot.version() == 1));
    fixture.replay.close();
    assert_eq!(handle.join(), FinishReason::Stopped);

    fixture.shutdown();
}

#[test]
fn test_max_train_steps_completes() {
    let fixture = Fixture::new(50);
    let handle = fixture
        .learner(
            LearnerConfig::new().with_max_train_steps(5).with_stats_freq(1),
            CountingTrainingStep::new(),
            None,
        )
        .spawn();

    let stats_rx = handle.stats_rx.clone();
    assert_eq!(handle.join(), FinishReason::Completed);

    let last = stats_rx.try_iter().last().unwrap();
    assert_eq!(last.train_steps, 5);
    // Initial publish plus one per step.
    assert_eq!(fixture.slot.version(), 6);
    fixture.shutdown();
}
