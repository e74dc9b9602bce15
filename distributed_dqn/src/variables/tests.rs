//! Tests for the parameter slot, cache and client.

use super::*;
use crate::core::{Clock, ManualClock, SharedClock, Snapshot};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Source that serves a slot but can be switched into failure.
struct FlakySource {
    slot: SharedVariableSlot<Vec<f32>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FlakySource {
    fn new(slot: SharedVariableSlot<Vec<f32>>) -> Arc<Self> {
        Arc::new(Self {
            slot,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VariableSource<Vec<f32>> for FlakySource {
    fn get_variables(&self) -> Result<Snapshot<Vec<f32>>, VariableError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(VariableError::Unavailable)
        } else {
            self.slot.get_variables()
        }
    }
}

fn cache_over(
    source: Arc<FlakySource>,
    clock: Arc<ManualClock>,
    config: CacheConfig,
) -> VariableCache<Vec<f32>> {
    let clock: SharedClock = clock;
    VariableCache::new("cache0", source, clock, config)
}

fn timing() -> CacheConfig {
    CacheConfig::new(Duration::from_millis(2000), Duration::from_millis(4000))
        .with_backoff(Duration::from_millis(10), Duration::from_millis(100))
}

// =============================================================================
// SLOT
// =============================================================================

mod slot_tests {
    use super::*;

    #[test]
    fn test_empty_slot_is_unavailable() {
        let slot: VariableSlot<Vec<f32>> = VariableSlot::new();
        assert_eq!(slot.get_variables().unwrap_err(), VariableError::Unavailable);
        assert_eq!(slot.version(), 0);
    }

    #[test]
    fn test_publish_bumps_version() {
        let slot = VariableSlot::with_initial(vec![0.0f32]);
        assert_eq!(slot.version(), 1);
        assert_eq!(slot.publish(vec![1.0]), 2);

        let snapshot = slot.get_variables().unwrap();
        assert_eq!(snapshot.version(), 2);
        assert_eq!(snapshot.params(), &vec![1.0]);
        assert_eq!(slot.stats(), (2, 1));
    }

    #[test]
    fn test_readers_keep_their_snapshot() {
        let slot = VariableSlot::with_initial(vec![1.0f32]);
        let held = slot.get_variables().unwrap();
        slot.publish(vec![2.0]);

        assert_eq!(held.params(), &vec![1.0]);
        assert_eq!(slot.get_variables().unwrap().params(), &vec![2.0]);
    }

    #[test]
    fn test_resume_at_continues_versions() {
        let slot = VariableSlot::resume_at(41);
        assert_eq!(slot.publish(vec![0.0f32]), 42);
    }

    #[test]
    fn test_closed_slot() {
        let slot = VariableSlot::with_initial(vec![0.0f32]);
        slot.close();
        assert_eq!(slot.get_variables().unwrap_err(), VariableError::Closed);
        assert!(slot.latest().is_some());
    }

    #[test]
    fn test_concurrent_publish_and_read() {
        let slot = variable_slot(vec![0u64; 64]);

        let writer_slot = Arc::clone(&slot);
        let writer = thread::spawn(move || {
            for i in 1..=500u64 {
                writer_slot.publish(vec![i; 64]);
            }
        });

        let mut last_version = 0;
        for _ in 0..500 {
            let snapshot = slot.get_variables().unwrap();
            // Every snapshot is internally consistent.
            let first = snapshot.params()[0];
            assert!(snapshot.params().iter().all(|&v| v == first));
            assert!(snapshot.version() >= last_version);
            last_version = snapshot.version();
        }
        writer.join().unwrap();
        assert_eq!(slot.version(), 501);
    }
}

// =============================================================================
// CACHE
// =============================================================================

mod cache_tests {
    use super::*;

    #[test]
    fn test_serves_cached_within_refresh_interval() {
        let slot = variable_slot(vec![1.0f32]);
        let source = FlakySource::new(Arc::clone(&slot));
        let clock = Arc::new(ManualClock::new());
        let cache = cache_over(Arc::clone(&source), Arc::clone(&clock), timing());

        assert_eq!(cache.get_variables().unwrap().version(), 1);
        slot.publish(vec![2.0]);

        clock.advance(Duration::from_millis(1500));
        assert_eq!(cache.get_variables().unwrap().version(), 1);
        assert_eq!(source.calls(), 1);

        clock.advance(Duration::from_millis(600));
        assert_eq!(cache.get_variables().unwrap().version(), 2);
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn test_failed_refresh_keeps_snapshot_until_stale() {
        let slot = variable_slot(vec![1.0f32]);
        let source = FlakySource::new(Arc::clone(&slot));
        let clock = Arc::new(ManualClock::new());
        let cache = cache_over(
            Arc::clone(&source),
            Arc::clone(&clock),
            timing().with_max_retries(3),
        );

        cache.get_variables().unwrap();
        source.set_failing(true);

        clock.advance(Duration::from_millis(3000));
        assert_eq!(cache.get_variables().unwrap().version(), 1);
    }

    #[test]
    fn test_stale_snapshot_is_rejected() {
        let slot = variable_slot(vec![1.0f32]);
        let source = FlakySource::new(Arc::clone(&slot));
        let clock = Arc::new(ManualClock::new());
        let cache = cache_over(
            Arc::clone(&source),
            Arc::clone(&clock),
            timing().with_max_retries(3),
        );

        cache.get_variables().unwrap();
        source.set_failing(true);
        let calls_before = source.calls();

        clock.advance(Duration::from_millis(4001));
        let err = cache.get_variables().unwrap_err();
        assert!(matches!(err, VariableError::Stale { age } if age > Duration::from_millis(4000)));
        // One due refresh plus three retries.
        assert_eq!(source.calls() - calls_before, 4);
        // Backoff 10 + 20 + 40 ms advanced the manual clock.
        assert_eq!(clock.elapsed(), Duration::from_millis(4001 + 70));
    }

    #[test]
    fn test_stale_retry_recovers_when_source_returns() {
        let slot = variable_slot(vec![1.0f32]);
        let source = FlakySource::new(Arc::clone(&slot));
        let clock = Arc::new(ManualClock::new());
        let cache = cache_over(Arc::clone(&source), Arc::clone(&clock), timing());

        cache.get_variables().unwrap();
        source.set_failing(true);
        slot.publish(vec![2.0]);
        clock.advance(Duration::from_millis(5000));

        let recover_source = Arc::clone(&source);
        let recover = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            recover_source.set_failing(false);
        });

        let wall = Instant::now();
        let snapshot = cache.get_variables().unwrap();
        recover.join().unwrap();

        assert_eq!(snapshot.version(), 2);
        assert!(wall.elapsed() < Duration::from_secs(5));
    }

    /// Clock whose `sleep` parks until the test opens the gate.
    struct GatedClock {
        inner: ManualClock,
        entered: crossbeam_channel::Sender<()>,
        gate: crossbeam_channel::Receiver<()>,
    }

    impl Clock for GatedClock {
        fn now(&self) -> Instant {
            self.inner.now()
        }

        fn sleep(&self, duration: Duration) {
            let _ = self.entered.send(());
            let _ = self.gate.recv();
            self.inner.advance(duration);
        }
    }

    #[test]
    fn test_backoff_does_not_block_other_readers() {
        let slot = variable_slot(vec![1.0f32]);
        let source = FlakySource::new(Arc::clone(&slot));
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let clock = Arc::new(GatedClock {
            inner: ManualClock::new(),
            entered: entered_tx,
            gate: gate_rx,
        });
        let shared_clock: SharedClock = clock.clone();
        let cache = Arc::new(VariableCache::new("cache0", source.clone(), shared_clock, timing()));

        cache.get_variables().unwrap();
        source.set_failing(true);
        slot.publish(vec![2.0]);
        clock.inner.advance(Duration::from_millis(5000));

        // First reader finds the snapshot stale and starts backing off.
        let waiting_cache = Arc::clone(&cache);
        let waiting = thread::spawn(move || waiting_cache.get_variables());
        entered_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("first reader never backed off");

        // Second reader gets through while the first is still asleep.
        source.set_failing(false);
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let other_cache = Arc::clone(&cache);
        let other = thread::spawn(move || {
            let _ = done_tx.send(other_cache.get_variables());
        });
        let served = done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("second reader blocked behind the backoff")
            .unwrap();
        assert_eq!(served.version(), 2);
        other.join().unwrap();

        gate_tx.send(()).unwrap();
        let snapshot = waiting.join().unwrap().unwrap();
        assert_eq!(snapshot.version(), 2);
        // Initial fetch, the first reader's failed refresh, the second
        // reader's refresh. The first reader reuses the second's result.
        assert_eq!(source.calls(), 3);
    }

    #[test]
    fn test_never_serves_older_than_stale_after() {
        // Refreshing on cadence: every served snapshot was fetched within
        // stale_after of the call.
        let slot = variable_slot(vec![0.0f32]);
        let source = FlakySource::new(Arc::clone(&slot));
        let clock = Arc::new(ManualClock::new());
        let cache = cache_over(Arc::clone(&source), Arc::clone(&clock), timing());

        let mut fetched_at = std::collections::HashMap::new();
        for step in 0..100u32 {
            let version = slot.publish(vec![step as f32]);
            fetched_at.insert(version, clock.elapsed());

            let served = cache.get_variables().unwrap();
            let published = fetched_at[&served.version()];
            assert!(clock.elapsed() - published <= Duration::from_millis(4000));

            clock.advance(Duration::from_millis(700));
        }
    }

    #[test]
    fn test_closed_source_propagates() {
        let slot = variable_slot(vec![0.0f32]);
        let source = FlakySource::new(Arc::clone(&slot));
        let clock = Arc::new(ManualClock::new());
        let cache = cache_over(Arc::clone(&source), Arc::clone(&clock), timing());

        slot.close();
        assert_eq!(cache.get_variables().unwrap_err(), VariableError::Closed);
    }

    #[test]
    #[should_panic(expected = "Invalid CacheConfig")]
    fn test_invalid_config_panics() {
        let slot = variable_slot(vec![0.0f32]);
        let clock = Arc::new(ManualClock::new());
        let _ = cache_over(
            FlakySource::new(slot),
            clock,
            CacheConfig::new(Duration::from_secs(5), Duration::from_secs(1)),
        );
    }
}

// =============================================================================
// CLIENT
// =============================================================================

mod client_tests {
    use super::*;

    fn wait_for<F: FnMut() -> bool>(mut cond: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_update_and_wait_fetches_synchronously() {
        let slot = variable_slot(vec![3.0f32]);
        let mut client: VariableClient<Vec<f32>> = VariableClient::new("actor0", slot, 10);

        assert!(client.params().is_none());
        client.update_and_wait().unwrap();
        assert_eq!(client.params(), Some(&vec![3.0]));
        assert_eq!(client.version(), 1);
    }

    #[test]
    fn test_update_fetches_every_period() {
        let slot = variable_slot(vec![0.0f32]);
        let mut client: VariableClient<Vec<f32>> = VariableClient::new("actor0", slot.clone(), 3);
        client.update_and_wait().unwrap();

        slot.publish(vec![1.0]);
        client.update().unwrap();
        client.update().unwrap();
        assert!(!client.is_fetching());

        client.update().unwrap();
        assert!(client.is_fetching());

        wait_for(|| {
            client.update().unwrap();
            client.version() == 2
        });
        assert_eq!(client.params(), Some(&vec![1.0]));
    }

    #[test]
    fn test_failed_fetch_keeps_last_known() {
        let slot = variable_slot(vec![5.0f32]);
        let source = FlakySource::new(Arc::clone(&slot));
        let mut client: VariableClient<Vec<f32>> = VariableClient::new("actor0", source.clone(), 1);
        client.update_and_wait().unwrap();

        source.set_failing(true);
        slot.publish(vec![6.0]);

        wait_for(|| {
            client.update().unwrap();
            client.failed_fetches() > 0
        });
        assert_eq!(client.params(), Some(&vec![5.0]));
        assert_eq!(client.version(), 1);
    }

    #[test]
    fn test_closed_source_surfaces_through_update() {
        let slot = variable_slot(vec![0.0f32]);
        let mut client: VariableClient<Vec<f32>> = VariableClient::new("actor0", slot.clone(), 1);
        client.update_and_wait().unwrap();
        slot.close();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match client.update() {
                Err(VariableError::Closed) => break,
                Ok(()) => {
                    assert!(Instant::now() < deadline);
                    thread::sleep(Duration::from_millis(1));
                }
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
    }
}
