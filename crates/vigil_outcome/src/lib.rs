// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Outcome types distributed by vigil caches.
//!
//! A cache computation either produces a value or a domain failure. Both are ordinary data:
//! [`Outcome`] models the settled result, and [`ProgressiveOutcome`] models what a live
//! observer sees while a computation may still be running.
//!
//! # Examples
//!
//! ```
//! use vigil_outcome::{Outcome, Progress, ProgressiveOutcome};
//!
//! let parsed: Outcome<String, i32> = "5".parse::<i32>().map_err(|e| e.to_string()).into();
//! assert_eq!(parsed, Outcome::Success(5));
//!
//! // While a newer value is being computed, observers keep seeing the previous one.
//! let refreshing = parsed.clone().with_progress(Progress::Loading);
//! assert_eq!(refreshing.value(), Some(&5));
//! assert!(!refreshing.is_done());
//!
//! // Once settled, the observer can extract the plain outcome again.
//! let settled = parsed.with_progress(Progress::Done);
//! assert_eq!(settled.into_settled(), Some(Outcome::Success(5)));
//!
//! let nothing_yet: ProgressiveOutcome<String, i32> = ProgressiveOutcome::Incomplete;
//! assert!(nothing_yet.into_settled().is_none());
//! ```

mod fault;
mod outcome;
mod progressive;

#[doc(inline)]
pub use fault::Fault;
#[doc(inline)]
pub use outcome::Outcome;
#[doc(inline)]
pub use progressive::{Progress, ProgressiveOutcome};
