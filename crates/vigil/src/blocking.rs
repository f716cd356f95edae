// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Synchronous access to any [`Cache`].

use std::{collections::HashMap, fmt::Debug, hash::Hash, marker::PhantomData};

use parking_lot::Mutex;
use tokio::runtime::RuntimeFlavor;
use vigil_outcome::{Outcome, ProgressiveOutcome};

use crate::{Cache, Error, Result};

/// Lets synchronous code read and invalidate a [`Cache`].
///
/// [`get`](Self::get) blocks the calling thread until the key has a settled outcome. All other
/// operations forward to the wrapped cache and return as soon as their effects are visible;
/// none of them waits for a recomputation.
///
/// The wrapped cache must run its computations somewhere other than the calling thread, for
/// example on a runtime handed over through [`Spawner::from_handle`](crate::Spawner::from_handle).
/// Calling from a Tokio blocking thread, such as inside
/// [`spawn_blocking`](tokio::task::spawn_blocking), is fine. On a worker of a multi-thread
/// runtime the wait is moved off the worker with [`block_in_place`](tokio::task::block_in_place).
///
/// Under [`Retention::WhileObserved`](crate::Retention::WhileObserved) a value installed with
/// [`set`](Self::set) is kept until the next [`get`](Self::get) of the key has read it.
///
/// # Examples
///
/// ```
/// use vigil::{BlockingCache, InMemoryCache, Spawner};
/// use vigil_outcome::{Fault, Outcome};
///
/// let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().unwrap();
/// let cache = InMemoryCache::<u32, Fault, u32>::builder(|key: u32| async move { Outcome::Success(key + 1) })
///     .spawner(Spawner::from_handle(runtime.handle().clone()))
///     .build();
///
/// let blocking = BlockingCache::new(cache);
/// assert_eq!(blocking.get(&1).unwrap(), Outcome::Success(2));
///
/// blocking.set(&1, 10);
/// assert_eq!(blocking.get(&1).unwrap(), Outcome::Success(10));
/// ```
pub struct BlockingCache<K, F, V, C: Cache<K, F, V>> {
    inner: C,
    warm: Option<Mutex<HashMap<K, C::Subscription>>>,
    _types: PhantomData<fn() -> (F, V)>,
}

impl<K, F, V, C> BlockingCache<K, F, V, C>
where
    K: Clone + Eq + Hash,
    C: Cache<K, F, V>,
{
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            warm: None,
            _types: PhantomData,
        }
    }

    /// Keeps a standing subscription for every key read through [`get`](Self::get).
    ///
    /// A subscribed key is recomputed as soon as it expires, so later reads usually find a
    /// current value instead of waiting for one. Disabled by default.
    #[must_use]
    pub fn keep_warm(mut self, enabled: bool) -> Self {
        self.warm = enabled.then(|| Mutex::new(HashMap::new()));
        self
    }

    /// Returns the wrapped cache.
    #[must_use]
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Blocks until `key` has a settled outcome and returns it.
    ///
    /// Returns immediately when the key already holds a current value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AsyncContext`] when called from within a current-thread Tokio runtime,
    /// where blocking could stall the computation being waited for.
    pub fn get(&self, key: &K) -> Result<Outcome<F, V>> {
        let in_runtime = match tokio::runtime::Handle::try_current() {
            Err(_) => false,
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => true,
            Ok(_) => return Err(Error::AsyncContext),
        };

        if let Some(warm) = &self.warm {
            warm.lock().entry(key.clone()).or_insert_with(|| self.inner.get(key));
        }

        let wait = || futures::executor::block_on(self.inner.now(key));
        if in_runtime {
            // Hands the worker's queue to another thread; a no-op on blocking threads.
            Ok(tokio::task::block_in_place(wait))
        } else {
            Ok(wait())
        }
    }

    /// Drops the standing subscription kept for `key`, if any.
    ///
    /// Returns `true` if a subscription was released.
    pub fn release(&self, key: &K) -> bool {
        self.warm.as_ref().is_some_and(|warm| warm.lock().remove(key).is_some())
    }

    /// Returns the current state of `key` without blocking.
    pub fn snapshot(&self, key: &K) -> ProgressiveOutcome<F, V> {
        self.inner.snapshot(key)
    }

    /// Installs `value` for `key`.
    pub fn set(&self, key: &K, value: V) {
        self.inner.set(key, value);
    }

    /// Marks the value of `key` as outdated.
    pub fn expire(&self, key: &K) {
        self.inner.expire(key);
    }

    /// Marks every value as outdated.
    pub fn expire_all(&self) {
        self.inner.expire_all();
    }
}

impl<K, F, V, C> Debug for BlockingCache<K, F, V, C>
where
    C: Cache<K, F, V> + Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingCache")
            .field("inner", &self.inner)
            .field("warm", &self.warm.as_ref().map(|warm| warm.lock().len()))
            .finish()
    }
}
