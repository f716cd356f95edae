// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Time-based invalidation layered over any [`Cache`].

use std::{
    fmt::Debug,
    hash::Hash,
    marker::PhantomData,
    mem,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use dashmap::DashMap;
use futures::{Stream, StreamExt};
use vigil_outcome::{Outcome, ProgressiveOutcome};

use crate::{Cache, Spawner};

/// Expires each key of the wrapped cache a fixed time after its value settled.
///
/// A timer is armed when a key is first accessed and re-armed whenever a newly settled value
/// reaches one of this cache's subscriptions, including the one behind [`now`](Cache::now),
/// or is installed with [`set`](Cache::set). Reading a value that was already settled does not
/// extend its lifetime. When the timer fires, the key is expired on the wrapped cache; observed
/// keys are recomputed right away, unobserved ones on their next read.
///
/// Timers run through the given [`Spawner`], which must be backed by a Tokio runtime with
/// the time driver enabled.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use vigil::{Cache, ExpiringCache, InMemoryCache, Spawner};
/// use vigil_outcome::{Fault, Outcome};
///
/// # #[tokio::main]
/// # async fn main() {
/// let inner = InMemoryCache::<u32, Fault, u32>::new(|key: u32| async move { Outcome::Success(key) });
/// let cache = ExpiringCache::new(inner, Duration::from_secs(30), Spawner::tokio());
///
/// assert_eq!(cache.now(&3).await, Outcome::Success(3));
/// # }
/// ```
pub struct ExpiringCache<C, K> {
    expiry: Arc<Expiry<C, K>>,
}

struct Expiry<C, K> {
    inner: C,
    ttl: Duration,
    spawner: Spawner,
    armed: DashMap<K, u64>,
    next_token: AtomicU64,
}

impl<C, K> ExpiringCache<C, K>
where
    K: Eq + Hash,
{
    /// Wraps `inner` so that every key expires `ttl` after its value settled.
    #[must_use]
    pub fn new(inner: C, ttl: Duration, spawner: Spawner) -> Self {
        Self {
            expiry: Arc::new(Expiry {
                inner,
                ttl,
                spawner,
                armed: DashMap::new(),
                next_token: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the wrapped cache.
    #[must_use]
    pub fn inner(&self) -> &C {
        &self.expiry.inner
    }

    /// Returns the time a settled value stays current.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.expiry.ttl
    }

    /// Returns the number of keys with a pending expiration.
    #[must_use]
    pub fn armed(&self) -> usize {
        self.expiry.armed.len()
    }
}

impl<C, K> Expiry<C, K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    fn arm<F, V>(expiry: &Arc<Self>, key: &K)
    where
        C: Cache<K, F, V>,
        F: 'static,
        V: 'static,
    {
        let token = expiry.next_token.fetch_add(1, Ordering::Relaxed);
        expiry.armed.insert(key.clone(), token);

        let weak = Arc::downgrade(expiry);
        let key = key.clone();
        let ttl = expiry.ttl;
        expiry.spawner.spawn(async move {
            tokio::time::sleep(ttl).await;

            let Some(expiry) = weak.upgrade() else {
                return;
            };

            // A later re-arm or an explicit expiration replaced this timer.
            if expiry.armed.remove_if(&key, |_, armed| *armed == token).is_some() {
                <C as Cache<K, F, V>>::expire(&expiry.inner, &key);
            }
        });
    }

    fn arm_if_absent<F, V>(expiry: &Arc<Self>, key: &K)
    where
        C: Cache<K, F, V>,
        F: 'static,
        V: 'static,
    {
        if !expiry.armed.contains_key(key) {
            Self::arm::<F, V>(expiry, key);
        }
    }
}

impl<C, K, F, V> Cache<K, F, V> for ExpiringCache<C, K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    F: 'static,
    V: 'static,
    C: Cache<K, F, V> + 'static,
{
    type Subscription = ExpiringSubscription<C, K, F, V>;

    fn get(&self, key: &K) -> Self::Subscription {
        Expiry::arm_if_absent::<F, V>(&self.expiry, key);
        ExpiringSubscription {
            inner: self.expiry.inner.get(key),
            expiry: Arc::clone(&self.expiry),
            key: key.clone(),
            current: true,
            _types: PhantomData,
        }
    }

    fn snapshot(&self, key: &K) -> ProgressiveOutcome<F, V> {
        Expiry::arm_if_absent::<F, V>(&self.expiry, key);
        self.expiry.inner.snapshot(key)
    }

    fn now(&self, key: &K) -> impl Future<Output = Outcome<F, V>> + Send {
        let mut subscription = self.get(key);
        async move {
            while let Some(item) = subscription.next().await {
                if let Some(outcome) = item.into_settled() {
                    return outcome;
                }
            }

            // Subscriptions of the wrapped cache never end.
            std::future::pending().await
        }
    }

    fn set(&self, key: &K, value: V) {
        self.expiry.inner.set(key, value);
        Expiry::arm::<F, V>(&self.expiry, key);
    }

    fn expire(&self, key: &K) {
        self.expiry.armed.remove(key);
        self.expiry.inner.expire(key);
    }

    fn expire_all(&self) {
        self.expiry.armed.clear();
        self.expiry.inner.expire_all();
    }
}

/// A subscription of an [`ExpiringCache`] that re-arms the key's timer whenever a new value
/// settles.
pub struct ExpiringSubscription<C: Cache<K, F, V>, K, F, V> {
    inner: C::Subscription,
    expiry: Arc<Expiry<C, K>>,
    key: K,
    // The first item is the state at subscription time, already covered by a timer.
    current: bool,
    _types: PhantomData<fn() -> (F, V)>,
}

// The inner subscription is `Unpin` and nothing else is ever pinned.
impl<C: Cache<K, F, V>, K, F, V> Unpin for ExpiringSubscription<C, K, F, V> {}

impl<C, K, F, V> Stream for ExpiringSubscription<C, K, F, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    F: 'static,
    V: 'static,
    C: Cache<K, F, V> + 'static,
{
    type Item = ProgressiveOutcome<F, V>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.inner.poll_next_unpin(cx);
        if let Poll::Ready(Some(item)) = &polled {
            let current = mem::replace(&mut self.current, false);
            if item.is_done() && !current {
                Expiry::arm::<F, V>(&self.expiry, &self.key);
            }
        }
        polled
    }
}

impl<C, K, F, V> Debug for ExpiringSubscription<C, K, F, V>
where
    C: Cache<K, F, V>,
    C::Subscription: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringSubscription")
            .field("inner", &self.inner)
            .field("ttl", &self.expiry.ttl)
            .finish_non_exhaustive()
    }
}

impl<C: Debug, K: Eq + Hash> Debug for ExpiringCache<C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("inner", &self.expiry.inner)
            .field("ttl", &self.expiry.ttl)
            .field("armed", &self.expiry.armed.len())
            .finish_non_exhaustive()
    }
}
