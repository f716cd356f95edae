// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-key state machine.
//!
//! Every transition happens under the entry mutex, and every change of the published view is
//! written to the watch channel before that mutex is released. Observers therefore see the
//! transitions of a key in the order they happened.

use std::mem;

use futures::future::{AbortHandle, AbortRegistration};
use parking_lot::Mutex;
use tokio::sync::watch;
use vigil_outcome::{Outcome, Progress, ProgressiveOutcome};

use super::StaleValues;

/// The entry was removed from the table; look the key up again.
#[derive(Debug)]
pub(crate) struct Retired;

/// A computation the caller must spawn once the entry lock is released.
#[derive(Debug)]
pub(crate) struct Launch {
    pub(crate) generation: u64,
    pub(crate) registration: AbortRegistration,
}

/// The effects of a `set` or `expire`.
#[derive(Debug)]
pub(crate) struct Transition {
    pub(crate) generation: u64,
    pub(crate) cancelled: bool,
    pub(crate) launch: Option<Launch>,
}

#[derive(Debug)]
pub(crate) enum Settlement {
    Accepted,
    Discarded { relaunch: Option<Launch> },
}

enum Phase<F, V> {
    Empty,
    Computing {
        generation: u64,
        abort: AbortHandle,
        previous: Option<Outcome<F, V>>,
    },
    Settled(Outcome<F, V>),
    Stale {
        previous: Option<Outcome<F, V>>,
    },
}

struct State<F, V> {
    phase: Phase<F, V>,
    generation: u64,
    subscribers: usize,
    retired: bool,
}

pub(crate) struct Entry<K, F, V> {
    key: K,
    stale_values: StaleValues,
    state: Mutex<State<F, V>>,
    sender: watch::Sender<ProgressiveOutcome<F, V>>,
}

impl<K, F, V> Entry<K, F, V> {
    pub(crate) fn new(key: K, stale_values: StaleValues) -> Self {
        Self {
            key,
            stale_values,
            state: Mutex::new(State {
                phase: Phase::Empty,
                generation: 0,
                subscribers: 0,
                retired: false,
            }),
            sender: watch::Sender::new(ProgressiveOutcome::Incomplete),
        }
    }

    pub(crate) fn key(&self) -> &K {
        &self.key
    }

    pub(crate) fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers
    }

    /// Returns the number of subscribers left.
    pub(crate) fn unsubscribe(&self) -> usize {
        let mut state = self.state.lock();
        state.subscribers = state.subscribers.saturating_sub(1);
        state.subscribers
    }

    /// Marks the entry as retired if nothing depends on it anymore.
    ///
    /// Must be called while the table shard holding the entry is locked for removal.
    pub(crate) fn try_retire(&self) -> bool {
        let mut state = self.state.lock();
        if state.retired || state.subscribers > 0 || matches!(state.phase, Phase::Computing { .. }) {
            return false;
        }

        state.retired = true;
        true
    }

    /// Aborts the computation in flight once nobody is subscribed anymore.
    ///
    /// The entry goes back to being stale, so the next reader starts over. Returns the
    /// generation of the abandoned computation.
    pub(crate) fn abandon(&self) -> Option<u64> {
        let mut state = self.state.lock();
        if state.subscribers > 0 || !matches!(state.phase, Phase::Computing { .. }) {
            return None;
        }

        let Phase::Computing { generation, abort, previous } = mem::replace(&mut state.phase, Phase::Empty) else {
            return None;
        };
        abort.abort();

        // Computing and stale entries publish the same view.
        state.phase = Phase::Stale { previous };
        Some(generation)
    }

    /// Aborts the computation in flight, if any.
    pub(crate) fn cancel(&self) -> bool {
        match &self.state.lock().phase {
            Phase::Computing { abort, .. } => {
                abort.abort();
                true
            }
            _ => false,
        }
    }
}

impl<K, F: Clone, V: Clone> Entry<K, F, V> {
    pub(crate) fn subscribe(&self) -> Result<(watch::Receiver<ProgressiveOutcome<F, V>>, Option<Launch>), Retired> {
        let mut state = self.state.lock();
        if state.retired {
            return Err(Retired);
        }

        state.subscribers += 1;
        let launch = demand(&mut *state);
        Ok((self.sender.subscribe(), launch))
    }

    pub(crate) fn snapshot(&self) -> Result<(ProgressiveOutcome<F, V>, Option<Launch>), Retired> {
        let mut state = self.state.lock();
        if state.retired {
            return Err(Retired);
        }

        let launch = demand(&mut *state);
        Ok((self.sender.borrow().clone(), launch))
    }

    pub(crate) fn set(&self, value: V) -> Result<Transition, Retired> {
        let mut state = self.state.lock();
        if state.retired {
            return Err(Retired);
        }

        state.generation += 1;
        let cancelled = match &state.phase {
            Phase::Computing { abort, .. } => {
                abort.abort();
                true
            }
            _ => false,
        };
        state.phase = Phase::Settled(Outcome::Success(value));
        self.publish(&state.phase);

        Ok(Transition {
            generation: state.generation,
            cancelled,
            launch: None,
        })
    }

    /// Returns `None` when the entry is retired.
    pub(crate) fn expire(&self) -> Option<Transition> {
        let mut state = self.state.lock();
        if state.retired {
            return None;
        }

        state.generation += 1;
        let mut cancelled = false;
        let mut was_settled = false;
        state.phase = match mem::replace(&mut state.phase, Phase::Empty) {
            Phase::Empty => Phase::Empty,
            Phase::Stale { previous } => Phase::Stale { previous },
            Phase::Computing { abort, previous, .. } => {
                abort.abort();
                cancelled = true;
                Phase::Stale { previous }
            }
            Phase::Settled(outcome) => {
                was_settled = true;
                Phase::Stale { previous: Some(outcome) }
            }
        };

        // Replacing a computation keeps the loading view, so only a settled value changes it.
        if was_settled {
            self.publish(&state.phase);
        }

        let launch = if state.subscribers > 0 { demand(&mut *state) } else { None };
        Some(Transition {
            generation: state.generation,
            cancelled,
            launch,
        })
    }

    pub(crate) fn settle(&self, generation: u64, outcome: Outcome<F, V>) -> Settlement {
        let mut state = self.state.lock();
        let owned = matches!(state.phase, Phase::Computing { generation: current, .. } if current == generation);
        if !owned {
            let relaunch = if state.subscribers > 0 && !state.retired && matches!(state.phase, Phase::Stale { .. }) {
                demand(&mut *state)
            } else {
                None
            };
            return Settlement::Discarded { relaunch };
        }

        state.phase = Phase::Settled(outcome);
        self.publish(&state.phase);
        Settlement::Accepted
    }

    fn publish(&self, phase: &Phase<F, V>) {
        let view = match phase {
            Phase::Empty => ProgressiveOutcome::Incomplete,
            Phase::Settled(outcome) => outcome.clone().with_progress(Progress::Done),
            Phase::Computing { previous, .. } | Phase::Stale { previous } => match (self.stale_values, previous) {
                (StaleValues::Replay, Some(previous)) => previous.clone().with_progress(Progress::Loading),
                _ => ProgressiveOutcome::Incomplete,
            },
        };
        self.sender.send_replace(view);
    }
}

/// Starts a computation unless one is running or a current value exists.
///
/// Leaves the published view untouched: an empty entry stays incomplete and a stale one keeps
/// its loading view.
fn demand<F, V>(state: &mut State<F, V>) -> Option<Launch> {
    let previous = match &mut state.phase {
        Phase::Empty => None,
        Phase::Stale { previous } => previous.take(),
        Phase::Computing { .. } | Phase::Settled(_) => return None,
    };

    let (abort, registration) = AbortHandle::new_pair();
    state.phase = Phase::Computing {
        generation: state.generation,
        abort,
        previous,
    };

    Some(Launch {
        generation: state.generation,
        registration,
    })
}
