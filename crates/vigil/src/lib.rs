// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Observable, coalescing caches of computed values.
//!
//! A vigil cache maps a key to a value produced by an asynchronous computation and keeps every
//! interested observer informed as that value is computed, invalidated and recomputed:
//!
//! - at most one computation runs per key, and concurrent readers share it,
//! - [`Cache::get`] returns a live stream of [`ProgressiveOutcome`]s for the key,
//! - [`Cache::expire`] cancels outdated work and recomputes observed keys right away,
//! - computation failures, panics included, reach observers as [`Outcome::Failure`].
//!
//! [`InMemoryCache`] is the implementation of [`Cache`]. [`BlockingCache`] lets synchronous
//! code use any cache, [`ExpiringCache`] adds time-based invalidation, and [`Backbone`] hands
//! out stable [`Ref`]s to individual keys.
//!
//! # Examples
//!
//! ```
//! use futures::StreamExt;
//! use vigil::{Cache, InMemoryCache};
//! use vigil_outcome::{Outcome, Progress};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! enum LookupFailure {
//!     Invalid,
//!     Unknown(String),
//! }
//!
//! impl From<vigil::Fault> for LookupFailure {
//!     fn from(fault: vigil::Fault) -> Self {
//!         Self::Unknown(fault.to_string())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cache = InMemoryCache::<String, LookupFailure, i32>::new(|key: String| async move {
//!     key.parse::<i32>().map_err(|_| LookupFailure::Invalid)
//! });
//!
//! assert_eq!(cache.now(&"5".to_string()).await, Outcome::Success(5));
//! assert_eq!(cache.now(&"x".to_string()).await, Outcome::Failure(LookupFailure::Invalid));
//!
//! let mut updates = cache.get(&"5".to_string());
//! let first = updates.next().await.expect("subscriptions never end");
//! assert_eq!(first.progress(), Progress::Done);
//!
//! cache.expire(&"5".to_string());
//! # }
//! ```

mod backbone;
mod blocking;
mod cache;
mod error;
mod expiry;
mod memory;
mod spawn;
mod telemetry;

#[doc(inline)]
pub use backbone::{Backbone, Ref};
#[doc(inline)]
pub use blocking::BlockingCache;
#[doc(inline)]
pub use cache::Cache;
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use expiry::{ExpiringCache, ExpiringSubscription};
#[doc(inline)]
pub use memory::{InMemoryCache, InMemoryCacheBuilder, Retention, StaleValues, Subscription};
#[doc(inline)]
pub use spawn::Spawner;
#[doc(inline)]
pub use telemetry::CacheName;
#[doc(inline)]
pub use vigil_outcome::{Fault, Outcome, Progress, ProgressiveOutcome};
