// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{
    fmt::Debug,
    hash::Hash,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::{Stream, StreamExt};
use tokio_stream::wrappers::WatchStream;
use vigil_outcome::{Outcome, ProgressiveOutcome};

use super::{Shared, entry::Entry};

/// A live view of one key of an [`InMemoryCache`](super::InMemoryCache).
///
/// Yields the current state of the key first, then every later state. Intermediate states
/// may be skipped when the subscriber falls behind, but the latest state is always delivered.
/// The stream never ends; dropping it unsubscribes.
pub struct Subscription<K: Eq + Hash, F, V> {
    stream: WatchStream<ProgressiveOutcome<F, V>>,
    guard: SubscriberGuard<K, F, V>,
}

struct SubscriberGuard<K: Eq + Hash, F, V> {
    shared: Arc<Shared<K, F, V>>,
    entry: Arc<Entry<K, F, V>>,
}

impl<K, F, V> Subscription<K, F, V>
where
    K: Eq + Hash,
    F: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(super) fn new(
        shared: Arc<Shared<K, F, V>>,
        entry: Arc<Entry<K, F, V>>,
        receiver: tokio::sync::watch::Receiver<ProgressiveOutcome<F, V>>,
    ) -> Self {
        Self {
            stream: WatchStream::new(receiver),
            guard: SubscriberGuard { shared, entry },
        }
    }

    /// Waits for the next settled outcome, skipping incomplete and loading states.
    ///
    /// Returns immediately if the current state has not been consumed yet and is settled.
    pub async fn settled(&mut self) -> Outcome<F, V> {
        while let Some(item) = self.stream.next().await {
            if let Some(outcome) = item.into_settled() {
                return outcome;
            }
        }

        // The guard keeps the sender alive, so the stream cannot end.
        std::future::pending().await
    }
}

impl<K, F, V> Stream for Subscription<K, F, V>
where
    K: Eq + Hash,
    F: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    type Item = ProgressiveOutcome<F, V>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.poll_next_unpin(cx)
    }
}

impl<K: Eq + Hash, F, V> Debug for Subscription<K, F, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cache", &self.guard.shared.telemetry.name())
            .field("generation", &self.guard.entry.generation())
            .finish_non_exhaustive()
    }
}

impl<K: Eq + Hash, F, V> Drop for SubscriberGuard<K, F, V> {
    fn drop(&mut self) {
        if self.entry.unsubscribe() == 0 {
            self.shared.on_unobserved(&self.entry);
        }
    }
}
