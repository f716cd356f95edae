// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Stable references to cached values.
//!
//! A [`Backbone`] gives a cache a name and hands out [`Ref`]s: cheap, cloneable handles that
//! identify one key of one cache. Code that only needs to observe a value can hold a `Ref`
//! without knowing which cache backs it.

use std::{
    fmt::Debug,
    hash::{Hash, Hasher},
    marker::PhantomData,
    sync::Arc,
};

use vigil_outcome::{Outcome, ProgressiveOutcome};

use crate::Cache;

/// A named cache that hands out [`Ref`]s to its keys.
///
/// # Examples
///
/// ```
/// use vigil::{Backbone, InMemoryCache};
/// use vigil_outcome::{Fault, Outcome};
///
/// # #[tokio::main]
/// # async fn main() {
/// let cache = InMemoryCache::<String, Fault, usize>::new(|key: String| async move { Outcome::Success(key.len()) });
/// let backbone: Backbone<String, Fault, usize, _> = Backbone::new("lengths", cache);
///
/// let hello = backbone.reference("hello".to_string());
/// assert_eq!(hello.now().await, Outcome::Success(5));
/// # }
/// ```
pub struct Backbone<K, F, V, C> {
    name: &'static str,
    cache: Arc<C>,
    _types: PhantomData<fn(K) -> (F, V)>,
}

impl<K, F, V, C> Backbone<K, F, V, C>
where
    C: Cache<K, F, V>,
{
    /// Names `cache` and takes ownership of it.
    #[must_use]
    pub fn new(name: &'static str, cache: C) -> Self {
        Self::from_arc(name, Arc::new(cache))
    }

    /// Names a cache that is already shared.
    #[must_use]
    pub fn from_arc(name: &'static str, cache: Arc<C>) -> Self {
        Self {
            name,
            cache,
            _types: PhantomData,
        }
    }

    /// Returns the name of the backbone.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the cache behind the backbone.
    #[must_use]
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Returns a reference to `key`.
    #[must_use]
    pub fn reference(&self, key: K) -> Ref<K, F, V, C> {
        Ref {
            backbone: self.clone(),
            key,
        }
    }
}

impl<K, F, V, C> Clone for Backbone<K, F, V, C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            cache: Arc::clone(&self.cache),
            _types: PhantomData,
        }
    }
}

impl<K, F, V, C> Debug for Backbone<K, F, V, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backbone").field("name", &self.name).finish_non_exhaustive()
    }
}

/// A handle to one key of a [`Backbone`].
///
/// Two refs are equal when they point at the same key of the same cache instance.
pub struct Ref<K, F, V, C> {
    backbone: Backbone<K, F, V, C>,
    key: K,
}

impl<K, F, V, C> Ref<K, F, V, C>
where
    C: Cache<K, F, V>,
{
    /// Subscribes to the live value behind this reference.
    ///
    /// Equivalent to [`Cache::get`] on the backing cache.
    #[must_use]
    pub fn request(&self) -> C::Subscription {
        self.backbone.cache.get(&self.key)
    }

    /// Waits for the first settled outcome observed after this call.
    pub async fn now(&self) -> Outcome<F, V> {
        self.backbone.cache.now(&self.key).await
    }

    /// Returns the current state of the referenced value without subscribing.
    #[must_use]
    pub fn snapshot(&self) -> ProgressiveOutcome<F, V> {
        self.backbone.cache.snapshot(&self.key)
    }

    /// Marks the referenced value as outdated.
    pub fn expire(&self) {
        self.backbone.cache.expire(&self.key);
    }

    /// Returns the referenced key.
    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns the name of the backbone this reference belongs to.
    #[must_use]
    pub fn backbone_name(&self) -> &'static str {
        self.backbone.name
    }
}

impl<K: Clone, F, V, C> Clone for Ref<K, F, V, C> {
    fn clone(&self) -> Self {
        Self {
            backbone: self.backbone.clone(),
            key: self.key.clone(),
        }
    }
}

impl<K: PartialEq, F, V, C> PartialEq for Ref<K, F, V, C> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.backbone.cache, &other.backbone.cache) && self.key == other.key
    }
}

impl<K: Eq, F, V, C> Eq for Ref<K, F, V, C> {}

impl<K: Hash, F, V, C> Hash for Ref<K, F, V, C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.backbone.cache).hash(state);
        self.key.hash(state);
    }
}

impl<K: Debug, F, V, C> Debug for Ref<K, F, V, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ref")
            .field("backbone", &self.backbone.name)
            .field("key", &self.key)
            .finish()
    }
}
