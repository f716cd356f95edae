// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for misuse of the cache adapters.
//!
//! Cache operations themselves never fail; computation failures travel as
//! [`Outcome::Failure`](vigil_outcome::Outcome::Failure). The errors here report that a caller
//! broke a precondition.

/// A specialized [`Result`] type for vigil operations that can reject their caller.
pub type Result<T> = std::result::Result<T, Error>;

/// An error caused by calling a vigil API in a context it does not support.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A blocking call was made from within a current-thread Tokio runtime.
    ///
    /// Blocking there can stall the very computation being waited for, and such a runtime
    /// offers no way to move the wait elsewhere. Use the asynchronous [`Cache`](crate::Cache)
    /// API from async code instead.
    #[error("blocking cache access from within an async runtime context")]
    AsyncContext,
}
