// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `InMemoryCache`.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::{StreamExt, future::join_all};
use testing_aids::{LogCapture, Probe, TEST_TIMEOUT};
use tokio::sync::Semaphore;
use vigil::{Cache, Fault, InMemoryCache, Outcome, Progress, ProgressiveOutcome, Retention, StaleValues, Subscription};

#[derive(Clone, Debug, PartialEq, Eq)]
enum TestFailure {
    Invalid,
    Unknown(String),
}

impl From<Fault> for TestFailure {
    fn from(fault: Fault) -> Self {
        Self::Unknown(fault.to_string())
    }
}

type Items = ProgressiveOutcome<TestFailure, u32>;

/// Holds computations until the test lets them through.
#[derive(Clone)]
struct Gate(Arc<Semaphore>);

impl Gate {
    fn closed() -> Self {
        Self(Arc::new(Semaphore::new(0)))
    }

    fn open(&self, computations: usize) {
        self.0.add_permits(computations);
    }

    async fn pass(&self) {
        self.0.acquire().await.expect("gate never closes").forget();
    }
}

/// A cache whose computation returns the number of computations that ran before it.
fn counting_cache(probe: &Probe) -> InMemoryCache<&'static str, TestFailure, u32> {
    let probe = probe.clone();
    InMemoryCache::new(move |_key: &'static str| {
        let ordinal = probe.hit();
        async move { Outcome::Success(u32::try_from(ordinal).expect("few computations")) }
    })
}

/// Like [`counting_cache`], but every computation waits for the gate.
fn gated_cache(probe: &Probe, gate: &Gate, stale_values: StaleValues) -> InMemoryCache<&'static str, TestFailure, u32> {
    let probe = probe.clone();
    let gate = gate.clone();
    InMemoryCache::builder(move |_key: &'static str| {
        let ordinal = probe.hit();
        let gate = gate.clone();
        async move {
            gate.pass().await;
            Outcome::Success(u32::try_from(ordinal).expect("few computations"))
        }
    })
    .stale_values(stale_values)
    .build()
}

struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A cache whose computations never finish and count how often they are dropped.
fn stalled_cache(retention: Retention, started: &Probe, dropped: &Arc<AtomicUsize>) -> InMemoryCache<&'static str, TestFailure, u32> {
    let started = started.clone();
    let dropped = Arc::clone(dropped);
    InMemoryCache::builder(move |_key: &'static str| {
        let guard = DropCounter(Arc::clone(&dropped));
        started.hit();
        async move {
            let _guard = guard;
            std::future::pending::<Outcome<TestFailure, u32>>().await
        }
    })
    .retention(retention)
    .build()
}

async fn next(subscription: &mut Subscription<&'static str, TestFailure, u32>) -> Items {
    tokio::time::timeout(TEST_TIMEOUT, subscription.next())
        .await
        .expect("subscription produced no item in time")
        .expect("subscriptions never end")
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(TEST_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn snapshot_reports_parse_outcomes() {
    let cache = InMemoryCache::<&'static str, TestFailure, i32>::new(|key: &'static str| async move {
        key.parse::<i32>().map_err(|_| TestFailure::Invalid)
    });

    assert_eq!(cache.now(&"5").await, Outcome::Success(5));
    assert_eq!(cache.now(&"x").await, Outcome::Failure(TestFailure::Invalid));

    assert_eq!(
        cache.snapshot(&"5"),
        ProgressiveOutcome::Success {
            value: 5,
            progress: Progress::Done
        }
    );
    assert_eq!(
        cache.snapshot(&"x"),
        ProgressiveOutcome::Failure {
            failure: TestFailure::Invalid,
            progress: Progress::Done
        }
    );
}

#[tokio::test]
async fn snapshot_starts_computation() {
    let probe = Probe::new();
    let gate = Gate::closed();
    let cache = gated_cache(&probe, &gate, StaleValues::Replay);

    assert!(cache.snapshot(&"key").is_incomplete());
    eventually(|| probe.calls() == 1).await;

    gate.open(1);
    assert_eq!(cache.now(&"key").await, Outcome::Success(0));
    assert_eq!(probe.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reads_share_one_computation() {
    let probe = Probe::new();
    let gate = Gate::closed();
    let cache = gated_cache(&probe, &gate, StaleValues::Replay);

    let readers: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.now(&"key").await })
        })
        .collect();

    eventually(|| cache.subscriber_count(&"key") == 16).await;
    gate.open(16);

    for outcome in join_all(readers).await {
        assert_eq!(outcome.expect("reader task"), Outcome::Success(0));
    }
    assert_eq!(probe.calls(), 1);
}

#[tokio::test]
async fn expire_forces_recomputation() {
    let probe = Probe::new();
    let cache = counting_cache(&probe);

    assert_eq!(cache.now(&"key").await, Outcome::Success(0));
    assert_eq!(cache.now(&"key").await, Outcome::Success(0));

    cache.expire(&"key");
    assert_eq!(cache.now(&"key").await, Outcome::Success(1));
    assert_eq!(probe.calls(), 2);
}

#[tokio::test]
async fn expire_is_idempotent() {
    let probe = Probe::new();
    let cache = counting_cache(&probe);

    assert_eq!(cache.now(&"key").await, Outcome::Success(0));
    cache.expire(&"key");
    cache.expire(&"key");

    assert_eq!(cache.now(&"key").await, Outcome::Success(1));
    assert_eq!(probe.calls(), 2);
}

#[tokio::test]
async fn expire_of_unknown_key_is_a_no_op() {
    let probe = Probe::new();
    let cache = counting_cache(&probe);

    cache.expire(&"never seen");
    assert!(cache.is_empty());
    assert_eq!(probe.calls(), 0);
}

#[tokio::test]
async fn expire_all_recomputes_existing_keys_only() {
    let probe = Probe::new();
    let cache = counting_cache(&probe);

    for key in ["a", "b", "c"] {
        let _ = cache.now(&key).await;
    }
    assert_eq!(probe.calls(), 3);

    cache.expire_all();
    for key in ["a", "b", "c"] {
        let _ = cache.now(&key).await;
    }
    assert_eq!(probe.calls(), 6);

    let _ = cache.now(&"d").await;
    assert_eq!(probe.calls(), 7);
    assert_eq!(cache.len(), 4);
}

#[tokio::test]
async fn expire_while_computing_discards_outdated_work() {
    let probe = Probe::new();
    let gate = Gate::closed();
    let cache = gated_cache(&probe, &gate, StaleValues::Replay);

    let mut subscription = cache.get(&"key");
    assert!(next(&mut subscription).await.is_incomplete());
    eventually(|| probe.calls() == 1).await;

    // Observed keys are recomputed right away.
    cache.expire(&"key");
    eventually(|| probe.calls() == 2).await;

    gate.open(2);
    assert_eq!(subscription.settled().await, Outcome::Success(1));
    assert_eq!(cache.snapshot(&"key").value(), Some(&1));
}

#[tokio::test]
async fn set_installs_value_without_computing() {
    let probe = Probe::new();
    let cache = counting_cache(&probe);

    cache.set(&"key", 42);
    assert_eq!(cache.now(&"key").await, Outcome::Success(42));
    assert_eq!(probe.calls(), 0);

    cache.expire(&"key");
    assert_eq!(cache.now(&"key").await, Outcome::Success(0));
}

#[tokio::test]
async fn set_cancels_computation_in_flight() {
    let probe = Probe::new();
    let gate = Gate::closed();
    let cache = gated_cache(&probe, &gate, StaleValues::Replay);

    let mut subscription = cache.get(&"key");
    eventually(|| probe.calls() == 1).await;

    cache.set(&"key", 7);
    gate.open(1);
    assert_eq!(subscription.settled().await, Outcome::Success(7));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        cache.snapshot(&"key"),
        ProgressiveOutcome::Success {
            value: 7,
            progress: Progress::Done
        }
    );
}

#[tokio::test]
async fn subscribers_see_every_settled_change() {
    let probe = Probe::new();
    let gate = Gate::closed();
    let cache = gated_cache(&probe, &gate, StaleValues::Replay);

    cache.set(&"key", 5);
    let mut first = cache.get(&"key");
    let mut second = cache.get(&"key");
    assert_eq!(cache.subscriber_count(&"key"), 2);

    let settled = ProgressiveOutcome::Success {
        value: 5,
        progress: Progress::Done,
    };
    assert_eq!(next(&mut first).await, settled);
    assert_eq!(next(&mut second).await, settled);

    cache.expire(&"key");
    let loading = ProgressiveOutcome::Success {
        value: 5,
        progress: Progress::Loading,
    };
    assert_eq!(next(&mut first).await, loading);
    assert_eq!(next(&mut second).await, loading);

    gate.open(1);
    let recomputed = ProgressiveOutcome::Success {
        value: 0,
        progress: Progress::Done,
    };
    assert_eq!(next(&mut first).await, recomputed);
    assert_eq!(next(&mut second).await, recomputed);

    drop(second);
    assert_eq!(cache.subscriber_count(&"key"), 1);
}

#[tokio::test]
async fn hidden_stale_values_are_incomplete() {
    let probe = Probe::new();
    let gate = Gate::closed();
    let cache = gated_cache(&probe, &gate, StaleValues::Hide);

    cache.set(&"key", 5);
    let mut subscription = cache.get(&"key");
    assert_eq!(next(&mut subscription).await.value(), Some(&5));

    cache.expire(&"key");
    assert!(next(&mut subscription).await.is_incomplete());

    gate.open(1);
    assert_eq!(subscription.settled().await, Outcome::Success(0));
}

#[tokio::test]
async fn panicking_computation_becomes_fault() {
    let probe = Probe::new();
    let computations = probe.clone();
    let cache = InMemoryCache::<&'static str, TestFailure, u32>::new(move |key: &'static str| {
        let ordinal = computations.hit();
        async move {
            assert!(ordinal > 0, "computation of {key} exploded");
            Outcome::Success(1)
        }
    });

    match cache.now(&"key").await {
        Outcome::Failure(TestFailure::Unknown(message)) => assert!(message.contains("exploded"), "got: {message}"),
        other => panic!("expected a fault, got {other:?}"),
    }

    cache.expire(&"key");
    assert_eq!(cache.now(&"key").await, Outcome::Success(1));
    assert_eq!(probe.calls(), 2);
}

#[tokio::test]
async fn while_observed_reclaims_unobserved_entries() {
    let probe = Probe::new();
    let computations = probe.clone();
    let cache = InMemoryCache::<&'static str, TestFailure, u32>::builder(move |_key: &'static str| {
        let ordinal = computations.hit();
        async move { Outcome::Success(u32::try_from(ordinal).expect("few computations")) }
    })
    .retention(Retention::WhileObserved)
    .build();

    let mut subscription = cache.get(&"key");
    assert_eq!(subscription.settled().await, Outcome::Success(0));
    assert_eq!(cache.len(), 1);

    drop(subscription);
    assert!(cache.is_empty());

    // The value was forgotten together with the entry.
    assert_eq!(cache.now(&"key").await, Outcome::Success(1));
    eventually(|| cache.is_empty()).await;
}

#[tokio::test]
async fn until_sweep_reclaims_on_demand() {
    let probe = Probe::new();
    let computations = probe.clone();
    let cache = InMemoryCache::<&'static str, TestFailure, u32>::builder(move |_key: &'static str| {
        let ordinal = computations.hit();
        async move { Outcome::Success(u32::try_from(ordinal).expect("few computations")) }
    })
    .retention(Retention::UntilSweep)
    .build();

    let observed = cache.get(&"observed");
    let _ = cache.now(&"idle").await;
    assert_eq!(cache.len(), 2);

    assert_eq!(cache.sweep(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.subscriber_count(&"observed"), 1);

    drop(observed);
    eventually(|| probe.calls() == 2).await;
    eventually(|| cache.sweep() == 1).await;
    assert!(cache.is_empty());
}

#[tokio::test]
async fn forever_never_sweeps() {
    let probe = Probe::new();
    let cache = counting_cache(&probe);

    let _ = cache.now(&"key").await;
    assert_eq!(cache.sweep(), 0);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn while_observed_keeps_writes_until_read() {
    let probe = Probe::new();
    let computations = probe.clone();
    let cache = InMemoryCache::<&'static str, TestFailure, u32>::builder(move |_key: &'static str| {
        let ordinal = computations.hit();
        async move { Outcome::Success(u32::try_from(ordinal).expect("few computations")) }
    })
    .retention(Retention::WhileObserved)
    .build();

    cache.set(&"key", 5);
    assert_eq!(cache.len(), 1);

    assert_eq!(cache.now(&"key").await, Outcome::Success(5));
    assert_eq!(probe.calls(), 0);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn losing_the_last_subscriber_cancels_computation() {
    let dropped = Arc::new(AtomicUsize::new(0));
    let started = Probe::new();
    let cache = stalled_cache(Retention::WhileObserved, &started, &dropped);

    let first = cache.get(&"key");
    let second = cache.get(&"key");
    eventually(|| started.calls() == 1).await;

    drop(first);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(dropped.load(Ordering::SeqCst), 0, "a subscriber is still attached");

    drop(second);
    eventually(|| dropped.load(Ordering::SeqCst) == 1).await;
    assert!(cache.is_empty());

    // The next reader starts over.
    let _again = cache.get(&"key");
    eventually(|| started.calls() == 2).await;
}

#[tokio::test]
async fn abandoned_now_cancels_computation() {
    let dropped = Arc::new(AtomicUsize::new(0));
    let started = Probe::new();
    let cache = stalled_cache(Retention::WhileObserved, &started, &dropped);

    let timed_out = tokio::time::timeout(Duration::from_millis(20), cache.now(&"key")).await;
    assert!(timed_out.is_err());

    eventually(|| dropped.load(Ordering::SeqCst) == 1).await;
    assert!(cache.is_empty());
}

#[tokio::test]
async fn retained_entries_finish_unobserved_computations() {
    let dropped = Arc::new(AtomicUsize::new(0));
    let started = Probe::new();
    let cache = stalled_cache(Retention::UntilSweep, &started, &dropped);

    drop(cache.get(&"key"));
    eventually(|| started.calls() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(dropped.load(Ordering::SeqCst), 0);
    assert_eq!(cache.sweep(), 0, "computing entries are kept");
}

#[tokio::test]
async fn dropping_the_cache_cancels_computations() {
    let dropped = Arc::new(AtomicUsize::new(0));
    let started = Probe::new();
    let cache = stalled_cache(Retention::Forever, &started, &dropped);

    assert!(cache.snapshot(&"key").is_incomplete());
    eventually(|| started.calls() == 1).await;

    drop(cache);
    eventually(|| dropped.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn lifecycle_is_logged() {
    let capture = LogCapture::new();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let probe = Probe::new();
    let computations = probe.clone();
    let cache = InMemoryCache::<&'static str, TestFailure, u32>::builder(move |_key: &'static str| {
        let ordinal = computations.hit();
        async move { Outcome::Success(u32::try_from(ordinal).expect("few computations")) }
    })
    .name("logged")
    .build();

    let _ = cache.now(&"key").await;
    cache.expire(&"key");
    cache.set(&"key", 3);
    cache.expire_all();

    capture.assert_contains("cache.name=\"logged\"");
    capture.assert_contains("cache.computing");
    capture.assert_contains("cache.settled");
    capture.assert_contains("cache.expired");
    capture.assert_contains("cache.installed");
    capture.assert_contains("cache.expired_all");
}

#[tokio::test]
async fn disabled_logs_stay_silent() {
    let capture = LogCapture::new();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let cache = InMemoryCache::<&'static str, TestFailure, u32>::builder(|_key: &'static str| async { Outcome::Success(1) })
        .logs(false)
        .build();

    let _ = cache.now(&"key").await;
    cache.expire(&"key");

    capture.assert_not_contains("cache.event");
}
