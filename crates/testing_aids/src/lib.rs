// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! An unpublished crate containing testing utilities for use within this repo.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

mod log;

pub use log::*;

/// If something (whatever) does not happen in a test within this time, the test will fail.
///
/// We are conservative here and allow much time - this is only to break out of deadlocks and
/// infinite loops, not for any situations that are actually expected.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Executes a thread-safe function on a background thread and abandons it if
/// it does not complete before [`TEST_TIMEOUT`].
///
/// Returns `None` if the function panicked or timed out.
#[must_use]
pub fn execute_or_abandon<F, R>(f: F) -> Option<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (sender, receiver) = mpsc::channel();

    // There are multiple ways for the called function to fail:
    // 1. It fails to finish in the allowed time span.
    // 2. It panics, so the result is never sent.
    //
    // In both cases, the channel will get closed and recv_timeout
    // will signal an error saying the channel is broken.
    thread::spawn(move || {
        let result = f();
        // The receiver is gone if we already timed out; nobody is interested anymore.
        let _ = sender.send(result);
    });

    receiver.recv_timeout(TEST_TIMEOUT).ok()
}

/// Counts how many times a computation function was invoked.
///
/// Clones share the same counter, so a clone can be moved into the computation while the test
/// keeps the original.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    calls: Arc<AtomicUsize>,
}

impl Probe {
    /// Creates a probe with no recorded invocations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one invocation and returns its zero-based ordinal.
    pub fn hit(&self) -> usize {
        self.calls.fetch_add(1, Ordering::SeqCst)
    }

    /// Returns the number of invocations recorded so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}
