// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring in-memory caches.

use std::{fmt::Debug, hash::Hash, sync::Arc};

use dashmap::DashMap;
use vigil_outcome::Fault;

use super::{Compute, InMemoryCache, Shared};
use crate::{Spawner, telemetry::CacheTelemetry};

const DEFAULT_NAME: &str = "in_memory";

/// Decides when an entry leaves the cache table.
///
/// Removing an entry forgets its value; the next access computes it again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum Retention {
    /// Entries are never removed.
    #[default]
    Forever,

    /// An entry is removed as soon as its last subscription is dropped.
    ///
    /// A computation still in flight at that point is cancelled. Entries that were never
    /// subscribed to, such as a key only written with `set` or read with `snapshot`, stay
    /// until a subscription to them ends or [`InMemoryCache::sweep`] removes them.
    WhileObserved,

    /// Entries with no subscribers and no computation in flight are removed by
    /// [`InMemoryCache::sweep`].
    UntilSweep,
}

/// Decides what observers see while an outdated value is being recomputed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum StaleValues {
    /// Observers keep seeing the last known outcome marked as [`Progress::Loading`](vigil_outcome::Progress::Loading).
    #[default]
    Replay,

    /// Observers see [`ProgressiveOutcome::Incomplete`](vigil_outcome::ProgressiveOutcome::Incomplete)
    /// until the recomputation settles.
    Hide,
}

/// Builder for configuring an [`InMemoryCache`].
///
/// Created by [`InMemoryCache::builder`].
///
/// # Examples
///
/// ```
/// use vigil::{InMemoryCache, Retention, StaleValues};
/// use vigil_outcome::{Fault, Outcome};
///
/// # #[tokio::main]
/// # async fn main() {
/// let cache = InMemoryCache::<String, Fault, usize>::builder(|key: String| async move {
///     Outcome::Success(key.len())
/// })
/// .name("lengths")
/// .retention(Retention::WhileObserved)
/// .stale_values(StaleValues::Hide)
/// .initial_capacity(64)
/// .build();
/// # let _ = cache;
/// # }
/// ```
pub struct InMemoryCacheBuilder<K, F, V> {
    compute: Arc<Compute<K, F, V>>,
    name: &'static str,
    retention: Retention,
    stale_values: StaleValues,
    spawner: Option<Spawner>,
    logs: bool,
    initial_capacity: usize,
    shard_amount: Option<usize>,
}

impl<K, F, V> InMemoryCacheBuilder<K, F, V> {
    pub(super) fn new(compute: Arc<Compute<K, F, V>>) -> Self {
        Self {
            compute,
            name: DEFAULT_NAME,
            retention: Retention::default(),
            stale_values: StaleValues::default(),
            spawner: None,
            logs: true,
            initial_capacity: 0,
            shard_amount: None,
        }
    }

    /// Sets the name reported in log events. Defaults to `"in_memory"`.
    #[must_use]
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Sets when entries are removed from the table. Defaults to [`Retention::Forever`].
    #[must_use]
    pub fn retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    /// Sets what observers see during recomputation. Defaults to [`StaleValues::Replay`].
    #[must_use]
    pub fn stale_values(mut self, stale_values: StaleValues) -> Self {
        self.stale_values = stale_values;
        self
    }

    /// Sets the spawner that runs computations.
    ///
    /// Defaults to [`Spawner::tokio`] for the runtime that calls [`build`](Self::build).
    #[must_use]
    pub fn spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Enables or disables log events. Enabled by default.
    #[must_use]
    pub fn logs(mut self, enabled: bool) -> Self {
        self.logs = enabled;
        self
    }

    /// Sets the number of keys to pre-allocate room for. Defaults to zero.
    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Sets the number of shards of the key table.
    ///
    /// Defaults to a multiple of the available parallelism.
    ///
    /// # Panics
    ///
    /// Panics if `shard_amount` is not a power of two greater than one.
    #[must_use]
    pub fn shard_amount(mut self, shard_amount: usize) -> Self {
        assert!(
            shard_amount > 1 && shard_amount.is_power_of_two(),
            "shard amount must be a power of two greater than one, got {shard_amount}"
        );
        self.shard_amount = Some(shard_amount);
        self
    }
}

impl<K, F, V> InMemoryCacheBuilder<K, F, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    F: From<Fault> + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Builds the cache.
    ///
    /// # Panics
    ///
    /// Panics if no spawner was configured and this is called outside of a Tokio runtime.
    #[must_use]
    pub fn build(self) -> InMemoryCache<K, F, V> {
        let table = match self.shard_amount {
            Some(shards) => DashMap::with_capacity_and_shard_amount(self.initial_capacity, shards),
            None => DashMap::with_capacity(self.initial_capacity),
        };

        InMemoryCache {
            shared: Arc::new(Shared {
                table,
                compute: self.compute,
                spawner: self.spawner.unwrap_or_else(Spawner::tokio),
                telemetry: CacheTelemetry::new(self.name, self.logs),
                retention: self.retention,
                stale_values: self.stale_values,
            }),
        }
    }
}

impl<K, F, V> Debug for InMemoryCacheBuilder<K, F, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCacheBuilder")
            .field("name", &self.name)
            .field("retention", &self.retention)
            .field("stale_values", &self.stale_values)
            .field("spawner", &self.spawner)
            .field("logs", &self.logs)
            .field("initial_capacity", &self.initial_capacity)
            .field("shard_amount", &self.shard_amount)
            .finish_non_exhaustive()
    }
}
