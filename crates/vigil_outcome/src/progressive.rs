// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::Outcome;

/// Whether a newer value is on its way.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Progress {
    /// Nothing is being computed; the accompanying value is current.
    #[default]
    Done,
    /// A computation is running; the accompanying value, if any, is about to be replaced.
    Loading,
}

/// An outcome as seen by a live observer.
///
/// Besides a settled success or failure, an observer may see [`ProgressiveOutcome::Incomplete`]
/// when no value exists yet, or a previous value tagged with [`Progress::Loading`] while the
/// cache recomputes it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProgressiveOutcome<F, V> {
    /// No value is available yet and one is being computed.
    Incomplete,
    /// A successful value.
    Success {
        /// The value.
        value: V,
        /// Whether a newer value is being computed.
        progress: Progress,
    },
    /// A domain failure.
    Failure {
        /// The failure.
        failure: F,
        /// Whether a newer value is being computed.
        progress: Progress,
    },
}

impl<F, V> ProgressiveOutcome<F, V> {
    /// Returns the progress marker. [`ProgressiveOutcome::Incomplete`] is always loading.
    #[must_use]
    pub fn progress(&self) -> Progress {
        match self {
            Self::Incomplete => Progress::Loading,
            Self::Success { progress, .. } | Self::Failure { progress, .. } => *progress,
        }
    }

    /// Returns `true` if this is a settled value that is not being recomputed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.progress() == Progress::Done
    }

    /// Returns `true` if no value is available yet.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete)
    }

    /// Returns the successful value, current or stale.
    #[must_use]
    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Success { value, .. } => Some(value),
            Self::Incomplete | Self::Failure { .. } => None,
        }
    }

    /// Returns the failure, current or stale.
    #[must_use]
    pub fn failure(&self) -> Option<&F> {
        match self {
            Self::Failure { failure, .. } => Some(failure),
            Self::Incomplete | Self::Success { .. } => None,
        }
    }

    /// Drops the progress marker, returning the last known outcome regardless of freshness.
    #[must_use]
    pub fn into_outcome(self) -> Option<Outcome<F, V>> {
        match self {
            Self::Incomplete => None,
            Self::Success { value, .. } => Some(Outcome::Success(value)),
            Self::Failure { failure, .. } => Some(Outcome::Failure(failure)),
        }
    }

    /// Returns the outcome only if it is settled ([`Progress::Done`]).
    #[must_use]
    pub fn into_settled(self) -> Option<Outcome<F, V>> {
        if self.is_done() { self.into_outcome() } else { None }
    }
}

impl<F, V> From<Outcome<F, V>> for ProgressiveOutcome<F, V> {
    fn from(outcome: Outcome<F, V>) -> Self {
        outcome.with_progress(Progress::Done)
    }
}
