// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! [`Spawner`] for running computations on any async runtime.

use std::{fmt::Debug, sync::Arc};

use futures::future::BoxFuture;

type SpawnFn = dyn Fn(BoxFuture<'static, ()>) + Send + Sync;

/// Runs background work for a cache.
///
/// Caches never run computations on the caller's task: each computation is a separate unit of
/// work handed to the spawner, which is what makes it cancellable and lets many keys compute
/// at the same time.
///
/// # Examples
///
/// Using the Tokio runtime the cache is built in:
///
/// ```
/// use vigil::Spawner;
///
/// # #[tokio::main]
/// # async fn main() {
/// let spawner = Spawner::tokio();
/// # let _ = spawner;
/// # }
/// ```
///
/// Using a dedicated runtime from synchronous code:
///
/// ```
/// use vigil::Spawner;
///
/// let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().unwrap();
/// let spawner = Spawner::from_handle(runtime.handle().clone());
/// # let _ = spawner;
/// ```
#[derive(Clone)]
pub struct Spawner(SpawnerKind);

#[derive(Clone)]
enum SpawnerKind {
    Tokio(tokio::runtime::Handle),
    Custom(Arc<SpawnFn>),
}

impl Spawner {
    /// Creates a spawner for the Tokio runtime of the calling context.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn tokio() -> Self {
        Self::from_handle(tokio::runtime::Handle::current())
    }

    /// Creates a spawner that runs work on the runtime behind `handle`.
    ///
    /// The handle may be used from any thread, including threads that are not part of the
    /// runtime.
    #[must_use]
    pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
        Self(SpawnerKind::Tokio(handle))
    }

    /// Creates a spawner from a closure that schedules boxed futures.
    ///
    /// The closure must not poll the future before returning.
    ///
    /// # Examples
    ///
    /// ```
    /// use vigil::Spawner;
    ///
    /// let spawner = Spawner::custom(|work| {
    ///     std::thread::spawn(move || futures::executor::block_on(work));
    /// });
    /// # let _ = spawner;
    /// ```
    pub fn custom<F>(spawn: F) -> Self
    where
        F: Fn(BoxFuture<'static, ()>) + Send + Sync + 'static,
    {
        Self(SpawnerKind::Custom(Arc::new(spawn)))
    }

    /// Schedules `work` in the background.
    pub(crate) fn spawn(&self, work: impl Future<Output = ()> + Send + 'static) {
        match &self.0 {
            SpawnerKind::Tokio(handle) => {
                // Completion is reported through the cache entry, not the join handle.
                drop(handle.spawn(work));
            }
            SpawnerKind::Custom(spawn) => spawn(Box::pin(work)),
        }
    }
}

impl Debug for Spawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            SpawnerKind::Tokio(_) => f.write_str("Spawner::Tokio"),
            SpawnerKind::Custom(_) => f.write_str("Spawner::Custom"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        mem,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn custom_spawner_receives_work() {
        let queue: Arc<Mutex<Vec<BoxFuture<'static, ()>>>> = Arc::default();
        let spawner = Spawner::custom({
            let queue = Arc::clone(&queue);
            move |work| queue.lock().push(work)
        });

        let ran = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&ran);
        spawner.spawn(async move {
            flag.fetch_add(1, Ordering::Relaxed);
        });

        assert_eq!(ran.load(Ordering::Relaxed), 0, "work is only queued");
        let queued = mem::take(&mut *queue.lock());
        assert_eq!(queued.len(), 1);

        futures::executor::block_on(futures::future::join_all(queued));
        assert_eq!(ran.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn tokio_spawner_runs_work() {
        let spawner = Spawner::tokio();
        let (tx, rx) = tokio::sync::oneshot::channel();
        spawner.spawn(async move {
            tx.send(42).expect("receiver alive");
        });
        assert_eq!(rx.await.expect("task ran"), 42);
    }

    #[test]
    fn debug_names_the_kind() {
        let spawner = Spawner::custom(drop);
        assert_eq!(format!("{spawner:?}"), "Spawner::Custom");
    }
}
