// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The in-memory [`Cache`] implementation.

mod builder;
mod entry;
mod subscription;

use std::{fmt::Debug, hash::Hash, panic::AssertUnwindSafe, sync::Arc};

pub use builder::{InMemoryCacheBuilder, Retention, StaleValues};
use dashmap::DashMap;
use entry::{Entry, Launch, Retired, Settlement, Transition};
use futures::{
    FutureExt,
    future::{Abortable, BoxFuture},
};
pub use subscription::Subscription;
use vigil_outcome::{Fault, Outcome, ProgressiveOutcome};

use crate::{
    Cache, Spawner,
    telemetry::{CacheActivity, CacheName, CacheTelemetry},
};

pub(crate) type Compute<K, F, V> = dyn Fn(K) -> BoxFuture<'static, Outcome<F, V>> + Send + Sync;

/// A [`Cache`] that keeps every entry in process memory.
///
/// Each key has at most one computation in flight. Concurrent readers of a key share it, and
/// its outcome is broadcast to every subscriber of the key. Invalidating a key cancels its
/// computation and, when the key is observed, starts a new one right away.
///
/// Cloning the cache is cheap and yields a handle to the same entries. Dropping the last
/// handle, including the ones held by live subscriptions, cancels every computation in
/// flight.
///
/// # Examples
///
/// ```
/// use futures::StreamExt;
/// use vigil::{Cache, InMemoryCache};
/// use vigil_outcome::{Fault, Outcome, Progress, ProgressiveOutcome};
///
/// # #[tokio::main]
/// # async fn main() {
/// let cache = InMemoryCache::<u32, Fault, u64>::new(|key: u32| async move {
///     Outcome::Success(u64::from(key) * 2)
/// });
///
/// assert_eq!(cache.now(&21).await, Outcome::Success(42));
///
/// let mut updates = cache.get(&21);
/// assert_eq!(updates.next().await.and_then(ProgressiveOutcome::into_settled), Some(Outcome::Success(42)));
///
/// cache.set(&21, 7);
/// let next = updates.next().await.expect("subscriptions never end");
/// assert_eq!(next.value(), Some(&7));
/// assert_eq!(next.progress(), Progress::Done);
/// # }
/// ```
pub struct InMemoryCache<K: Eq + Hash, F, V> {
    shared: Arc<Shared<K, F, V>>,
}

pub(crate) struct Shared<K: Eq + Hash, F, V> {
    table: DashMap<K, Arc<Entry<K, F, V>>>,
    compute: Arc<Compute<K, F, V>>,
    spawner: Spawner,
    telemetry: CacheTelemetry,
    retention: Retention,
    stale_values: StaleValues,
}

impl<K, F, V> InMemoryCache<K, F, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    F: From<Fault> + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache with default settings that computes values with `compute`.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime. Use [`builder`](Self::builder) with an
    /// explicit [`Spawner`] elsewhere.
    #[must_use]
    pub fn new<C, Fut>(compute: C) -> Self
    where
        C: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Into<Outcome<F, V>>,
    {
        Self::builder(compute).build()
    }

    /// Starts configuring a cache that computes values with `compute`.
    ///
    /// The computation may return an [`Outcome`] or a [`Result`]. A panic inside it is
    /// reported to observers as a failure converted from [`Fault`].
    pub fn builder<C, Fut>(compute: C) -> InMemoryCacheBuilder<K, F, V>
    where
        C: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Into<Outcome<F, V>>,
    {
        let compute: Arc<Compute<K, F, V>> = Arc::new(move |key: K| -> BoxFuture<'static, Outcome<F, V>> {
            let computation = compute(key);
            Box::pin(async move { computation.await.into() })
        });

        InMemoryCacheBuilder::new(compute)
    }

    /// Removes every entry that has no subscribers and no computation in flight.
    ///
    /// Only has an effect under [`Retention::UntilSweep`] and [`Retention::WhileObserved`];
    /// under [`Retention::Forever`] entries are never removed. Returns the number of entries
    /// removed.
    pub fn sweep(&self) -> usize {
        if self.shared.retention == Retention::Forever {
            return 0;
        }

        let telemetry = &self.shared.telemetry;
        let mut removed = 0;
        self.shared.table.retain(|_, entry| {
            if entry.try_retire() {
                telemetry.record(CacheActivity::Reclaimed, entry.generation());
                removed += 1;
                false
            } else {
                true
            }
        });

        removed
    }

    /// Returns the number of subscriptions currently attached to `key`.
    #[must_use]
    pub fn subscriber_count(&self, key: &K) -> usize {
        self.shared.table.get(key).map_or(0, |entry| entry.subscriber_count())
    }
}

impl<K: Eq + Hash, F, V> InMemoryCache<K, F, V> {
    /// Returns the name this cache reports in log events.
    #[must_use]
    pub fn name(&self) -> CacheName {
        self.shared.telemetry.name()
    }

    /// Returns the number of keys currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.table.len()
    }

    /// Returns `true` if the cache holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.table.is_empty()
    }
}

impl<K, F, V> Cache<K, F, V> for InMemoryCache<K, F, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    F: From<Fault> + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    type Subscription = Subscription<K, F, V>;

    fn get(&self, key: &K) -> Self::Subscription {
        Shared::subscribe(&self.shared, key)
    }

    fn snapshot(&self, key: &K) -> ProgressiveOutcome<F, V> {
        let (entry, (view, launch)) = self.shared.with_entry(key, Entry::snapshot);
        if let Some(launch) = launch {
            Shared::launch(&self.shared, &entry, launch);
        }
        view
    }

    fn now(&self, key: &K) -> impl Future<Output = Outcome<F, V>> + Send {
        let mut subscription = self.get(key);
        async move { subscription.settled().await }
    }

    fn set(&self, key: &K, value: V) {
        let (_, transition) = self.shared.with_entry(key, |entry| entry.set(value.clone()));
        // Installing a value never starts a computation.
        let _ = self.shared.after_transition(CacheActivity::Installed, transition);
    }

    fn expire(&self, key: &K) {
        let Some(entry) = self.shared.table.get(key).map(|entry| Arc::clone(entry.value())) else {
            return;
        };

        Shared::expire_entry(&self.shared, &entry);
    }

    fn expire_all(&self) {
        let entries: Vec<_> = self.shared.table.iter().map(|entry| Arc::clone(entry.value())).collect();
        self.shared.telemetry.record_expired_all(entries.len());

        for entry in &entries {
            Shared::expire_entry(&self.shared, entry);
        }
    }
}

impl<K, F, V> Shared<K, F, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    F: From<Fault> + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Runs `operation` on the live entry of `key`, creating the entry if needed.
    fn with_entry<R>(
        &self,
        key: &K,
        mut operation: impl FnMut(&Entry<K, F, V>) -> Result<R, Retired>,
    ) -> (Arc<Entry<K, F, V>>, R) {
        loop {
            let entry = self.lookup(key);
            if let Ok(result) = operation(entry.as_ref()) {
                return (entry, result);
            }
            // Retired entries are removed from the table before anyone can observe them
            // retired, so the next lookup finds a successor.
        }
    }

    fn lookup(&self, key: &K) -> Arc<Entry<K, F, V>> {
        if let Some(entry) = self.table.get(key) {
            return Arc::clone(entry.value());
        }

        let entry = self
            .table
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Entry::new(key.clone(), self.stale_values)));
        Arc::clone(entry.value())
    }

    fn subscribe(shared: &Arc<Self>, key: &K) -> Subscription<K, F, V> {
        let (entry, (receiver, launch)) = shared.with_entry(key, Entry::subscribe);
        if let Some(launch) = launch {
            Self::launch(shared, &entry, launch);
        }
        Subscription::new(Arc::clone(shared), entry, receiver)
    }

    fn expire_entry(shared: &Arc<Self>, entry: &Arc<Entry<K, F, V>>) {
        if let Some(transition) = entry.expire() {
            if let Some(launch) = shared.after_transition(CacheActivity::Expired, transition) {
                Self::launch(shared, entry, launch);
            }
        }
    }

    /// Logs a `set` or `expire` and returns the computation to start, if any.
    fn after_transition(&self, activity: CacheActivity, transition: Transition) -> Option<Launch> {
        self.telemetry.record(activity, transition.generation);
        if transition.cancelled {
            self.telemetry.record(CacheActivity::Cancelled, transition.generation - 1);
        }
        transition.launch
    }

    fn launch(shared: &Arc<Self>, entry: &Arc<Entry<K, F, V>>, launch: Launch) {
        let Launch { generation, registration } = launch;
        shared.telemetry.record(CacheActivity::Computing, generation);

        let compute = Arc::clone(&shared.compute);
        let key = entry.key().clone();
        let computation = AssertUnwindSafe(async move { compute(key).await }).catch_unwind();
        let work = Abortable::new(computation, registration);

        let weak = Arc::downgrade(shared);
        let entry = Arc::clone(entry);
        shared.spawner.spawn(async move {
            let Ok(result) = work.await else {
                // Whoever aborted the computation already replaced the entry state.
                return;
            };

            let Some(shared) = weak.upgrade() else {
                return;
            };

            let outcome = result.unwrap_or_else(|panic| {
                let fault = Fault::from_panic(panic);
                shared.telemetry.record_fault(generation, &fault);
                Outcome::Failure(F::from(fault))
            });

            Self::settle(&shared, &entry, generation, outcome);
        });
    }

    fn settle(shared: &Arc<Self>, entry: &Arc<Entry<K, F, V>>, generation: u64, outcome: Outcome<F, V>) {
        match entry.settle(generation, outcome) {
            Settlement::Accepted => shared.telemetry.record(CacheActivity::Settled, generation),
            Settlement::Discarded { relaunch } => {
                shared.telemetry.record(CacheActivity::Discarded, generation);
                if let Some(launch) = relaunch {
                    Self::launch(shared, entry, launch);
                }
            }
        }
    }
}

impl<K: Eq + Hash, F, V> Shared<K, F, V> {
    /// Called when the last subscription of `entry` is dropped.
    ///
    /// Under [`Retention::WhileObserved`] this cancels the computation in flight and reclaims
    /// the entry.
    fn on_unobserved(&self, entry: &Arc<Entry<K, F, V>>) {
        if self.retention != Retention::WhileObserved {
            return;
        }

        if let Some(generation) = entry.abandon() {
            self.telemetry.record(CacheActivity::Cancelled, generation);
        }

        let removed = self
            .table
            .remove_if(entry.key(), |_, current| Arc::ptr_eq(current, entry) && current.try_retire());
        if removed.is_some() {
            self.telemetry.record(CacheActivity::Reclaimed, entry.generation());
        }
    }
}

impl<K: Eq + Hash, F, V> Drop for Shared<K, F, V> {
    fn drop(&mut self) {
        for entry in self.table.iter() {
            entry.cancel();
        }
    }
}

impl<K: Eq + Hash, F, V> Clone for InMemoryCache<K, F, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K: Eq + Hash, F, V> Debug for InMemoryCache<K, F, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("name", &self.shared.telemetry.name())
            .field("len", &self.shared.table.len())
            .field("retention", &self.shared.retention)
            .field("stale_values", &self.shared.stale_values)
            .field("spawner", &self.shared.spawner)
            .finish_non_exhaustive()
    }
}
