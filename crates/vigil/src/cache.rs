// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The contract shared by every vigil cache.
//!
//! [`Cache`] maps a key to a lazily computed value and lets any number of observers follow that
//! value as it is computed, invalidated and recomputed. Implement it for a storage strategy,
//! then layer [`BlockingCache`](crate::BlockingCache) or
//! [`ExpiringCache`](crate::ExpiringCache) on top.

use futures::Stream;
use vigil_outcome::{Outcome, ProgressiveOutcome};

/// A keyed, observable cache of computation outcomes.
///
/// None of the operations fail: computation failures are delivered as
/// [`Outcome::Failure`] inside the values, never as errors of the operation itself.
///
/// Operations on a single key are linearizable. There is no ordering guarantee between
/// operations on different keys.
pub trait Cache<K, F, V>: Send + Sync {
    /// The live stream returned by [`get`](Self::get).
    type Subscription: Stream<Item = ProgressiveOutcome<F, V>> + Send + Unpin + 'static;

    /// Subscribes to the live value of `key`.
    ///
    /// The first item is the current state of the key, which is
    /// [`ProgressiveOutcome::Incomplete`] when nothing has been computed yet. Every later change
    /// (a computation settling, an invalidation, a `set`) produces another item. The stream never
    /// ends on its own; dropping it ends the subscription.
    fn get(&self, key: &K) -> Self::Subscription;

    /// Returns the current state of `key` without subscribing.
    ///
    /// Starts a computation if the key has no value or its value was expired.
    fn snapshot(&self, key: &K) -> ProgressiveOutcome<F, V>;

    /// Waits for the first settled outcome of `key` observed after this call.
    ///
    /// Returns immediately when the key already holds a current value. After an
    /// [`expire`](Self::expire), the returned outcome comes from a fresh computation.
    fn now(&self, key: &K) -> impl Future<Output = Outcome<F, V>> + Send;

    /// Installs `value` as the current value of `key`, bypassing the computation.
    ///
    /// Any computation in flight for the key is cancelled and its result will never be
    /// observed.
    fn set(&self, key: &K, value: V);

    /// Marks the value of `key` as outdated.
    ///
    /// A computation in flight for the key is cancelled. If the key has subscribers, a new
    /// computation starts right away; otherwise it starts on the next read.
    fn expire(&self, key: &K);

    /// Expires every key currently held by the cache.
    ///
    /// Keys first accessed after this call starts are not affected.
    fn expire_all(&self);
}
