// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `ExpiringCache`, driven by Tokio's paused clock.

use std::time::Duration;

use futures::StreamExt;
use testing_aids::Probe;
use tokio::time::{Instant, sleep, sleep_until};
use vigil::{Cache, ExpiringCache, ExpiringSubscription, Fault, InMemoryCache, Outcome, Progress, ProgressiveOutcome, Spawner};

const TTL: Duration = Duration::from_secs(10);

type Inner = InMemoryCache<u32, Fault, u32>;

fn inner(probe: &Probe, computation_time: Duration) -> Inner {
    let probe = probe.clone();
    InMemoryCache::new(move |_key: u32| {
        let ordinal = probe.hit();
        async move {
            sleep(computation_time).await;
            Outcome::Success(u32::try_from(ordinal).expect("few computations"))
        }
    })
}

async fn settled(subscription: &mut ExpiringSubscription<Inner, u32, Fault, u32>) -> Outcome<Fault, u32> {
    while let Some(item) = subscription.next().await {
        if let Some(outcome) = item.into_settled() {
            return outcome;
        }
    }
    unreachable!("subscriptions never end")
}

#[tokio::test(start_paused = true)]
async fn value_expires_after_ttl() {
    let probe = Probe::new();
    let cache = ExpiringCache::new(inner(&probe, Duration::ZERO), TTL, Spawner::tokio());

    assert_eq!(cache.now(&1).await, Outcome::Success(0));
    assert_eq!(cache.armed(), 1);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(cache.now(&1).await, Outcome::Success(0));

    sleep(Duration::from_secs(6)).await;
    assert_eq!(cache.armed(), 0);
    assert_eq!(cache.now(&1).await, Outcome::Success(1));
    assert_eq!(cache.armed(), 1);
    assert_eq!(probe.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn set_rearms_the_timer() {
    let probe = Probe::new();
    let cache = ExpiringCache::new(inner(&probe, Duration::ZERO), TTL, Spawner::tokio());

    cache.set(&1, 50);
    sleep(Duration::from_secs(8)).await;
    cache.set(&1, 60);

    // The first timer fires here but was replaced by the second `set`.
    sleep(Duration::from_secs(4)).await;
    assert_eq!(cache.now(&1).await, Outcome::Success(60));
    assert_eq!(probe.calls(), 0);

    sleep(Duration::from_secs(7)).await;
    assert_eq!(cache.now(&1).await, Outcome::Success(0));
    assert_eq!(probe.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn subscriptions_rearm_when_values_settle() {
    let probe = Probe::new();
    let cache = ExpiringCache::new(inner(&probe, Duration::from_secs(4)), TTL, Spawner::tokio());
    let start = Instant::now();

    let mut subscription = cache.get(&1);
    assert_eq!(settled(&mut subscription).await, Outcome::Success(0));

    // Armed again when the value settled at 4s, so it is still current past the first 10s.
    sleep_until(start + Duration::from_secs(12)).await;
    assert!(cache.snapshot(&1).is_done());

    // Expires at 14s and is recomputed right away because it is observed.
    assert_eq!(
        subscription.next().await,
        Some(ProgressiveOutcome::Success {
            value: 0,
            progress: Progress::Loading
        })
    );
    assert_eq!(settled(&mut subscription).await, Outcome::Success(1));
    let elapsed = Instant::now().duration_since(start);
    assert!(elapsed >= Duration::from_secs(18) && elapsed < Duration::from_secs(19), "settled after {elapsed:?}");
    assert_eq!(probe.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn explicit_expiration_disarms() {
    let probe = Probe::new();
    let cache = ExpiringCache::new(inner(&probe, Duration::ZERO), TTL, Spawner::tokio());

    let _ = cache.now(&1).await;
    let _ = cache.now(&2).await;
    assert_eq!(cache.armed(), 2);

    cache.expire(&1);
    assert_eq!(cache.armed(), 1);

    cache.expire_all();
    assert_eq!(cache.armed(), 0);

    assert_eq!(cache.now(&1).await, Outcome::Success(2));
    assert_eq!(cache.now(&2).await, Outcome::Success(3));
    assert_eq!(cache.ttl(), TTL);
}

#[tokio::test(start_paused = true)]
async fn now_measures_ttl_from_settlement() {
    let probe = Probe::new();
    let cache = ExpiringCache::new(inner(&probe, Duration::from_secs(4)), TTL, Spawner::tokio());
    let start = Instant::now();

    assert_eq!(cache.now(&1).await, Outcome::Success(0));

    // Settled at 4s, so the timer armed on access at 0s no longer applies.
    sleep_until(start + Duration::from_secs(12)).await;
    assert!(cache.snapshot(&1).is_done());
    assert_eq!(cache.armed(), 1);

    // Reading the settled value did not push the deadline past 14s.
    assert_eq!(cache.now(&1).await, Outcome::Success(0));
    sleep_until(start + Duration::from_secs(15)).await;
    assert!(!cache.snapshot(&1).is_done());
    assert_eq!(cache.now(&1).await, Outcome::Success(1));
    assert_eq!(probe.calls(), 2);
}
