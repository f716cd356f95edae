// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::{Progress, ProgressiveOutcome};

/// The settled result of a computation.
///
/// Failures are values, not control flow: a computation that cannot produce a `V` reports
/// `Failure(F)` and the cache hands it to observers exactly like a success.
///
/// # Examples
///
/// ```
/// use vigil_outcome::Outcome;
///
/// let ok: Outcome<&str, i32> = Outcome::Success(5);
/// assert_eq!(ok.map(|v| v * 2), Outcome::Success(10));
///
/// let failed: Outcome<&str, i32> = Err("invalid").into();
/// assert_eq!(failed.failure(), Some(&"invalid"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Outcome<F, V> {
    /// The computation produced a value.
    Success(V),
    /// The computation failed with a domain failure.
    Failure(F),
}

impl<F, V> Outcome<F, V> {
    /// Returns `true` if this is a [`Outcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns `true` if this is a [`Outcome::Failure`].
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns the successful value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// Returns the failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&F> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    /// Maps the successful value, leaving failures untouched.
    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> Outcome<F, U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::Failure(failure) => Outcome::Failure(failure),
        }
    }

    /// Maps the failure, leaving successful values untouched.
    pub fn map_failure<G>(self, f: impl FnOnce(F) -> G) -> Outcome<G, V> {
        match self {
            Self::Success(value) => Outcome::Success(value),
            Self::Failure(failure) => Outcome::Failure(f(failure)),
        }
    }

    /// Converts into a standard [`Result`].
    ///
    /// # Errors
    ///
    /// Returns the failure as the `Err` variant.
    pub fn into_result(self) -> Result<V, F> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }

    /// Attaches a [`Progress`] marker, producing what an observer would see.
    #[must_use]
    pub fn with_progress(self, progress: Progress) -> ProgressiveOutcome<F, V> {
        match self {
            Self::Success(value) => ProgressiveOutcome::Success { value, progress },
            Self::Failure(failure) => ProgressiveOutcome::Failure { failure, progress },
        }
    }
}

impl<F, V> From<Result<V, F>> for Outcome<F, V> {
    fn from(result: Result<V, F>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(failure) => Self::Failure(failure),
        }
    }
}

impl<F, V> From<Outcome<F, V>> for Result<V, F> {
    fn from(outcome: Outcome<F, V>) -> Self {
        outcome.into_result()
    }
}
