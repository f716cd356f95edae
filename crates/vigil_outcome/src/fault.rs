// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{any::Any, error::Error, sync::Arc};

/// A computation misbehaved instead of returning an outcome.
///
/// The cache catches panics raised by a computation and reports them to observers as a
/// failure carrying a `Fault`, so one faulty computation cannot take the cache down or leave
/// a key stuck in the computing state. The failure type of a cache must therefore be
/// constructible from a `Fault`:
///
/// ```
/// use vigil_outcome::Fault;
///
/// #[derive(Clone, Debug)]
/// enum LookupFailure {
///     NotFound,
///     Unknown(Fault),
/// }
///
/// impl From<Fault> for LookupFailure {
///     fn from(fault: Fault) -> Self {
///         Self::Unknown(fault)
///     }
/// }
///
/// let failure = LookupFailure::from(Fault::caused_by("backend went away"));
/// assert!(matches!(failure, LookupFailure::Unknown(_)));
/// ```
#[derive(Clone, Debug, thiserror::Error)]
#[error("unknown computation fault: {cause}")]
pub struct Fault {
    cause: Arc<dyn Error + Send + Sync>,
}

/// The panic payload, rendered as text.
#[derive(Debug, thiserror::Error)]
#[error("computation panicked: {0}")]
struct Panicked(String);

impl Fault {
    /// Creates a fault from any error or message.
    ///
    /// # Examples
    ///
    /// ```
    /// use vigil_outcome::Fault;
    ///
    /// let fault = Fault::caused_by("connection reset");
    /// assert_eq!(fault.cause().to_string(), "connection reset");
    /// ```
    pub fn caused_by(cause: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self {
            cause: Arc::from(cause.into()),
        }
    }

    /// Creates a fault from a panic payload as returned by [`std::panic::catch_unwind`].
    ///
    /// String payloads (the common case for `panic!`) are preserved as the message.
    #[must_use]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => payload
                .downcast_ref::<&'static str>()
                .map_or_else(|| "non-string panic payload".to_string(), |message| (*message).to_string()),
        };
        Self::caused_by(Panicked(message))
    }

    /// Returns the original cause.
    #[must_use]
    pub fn cause(&self) -> &(dyn Error + Send + Sync + 'static) {
        &*self.cause
    }
}

/// Faults are equal when they share a cause or their causes render the same message.
impl PartialEq for Fault {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cause, &other.cause) || self.cause.to_string() == other.cause.to_string()
    }
}

impl Eq for Fault {}
