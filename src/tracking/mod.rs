//! Image access tracking
//!
//! This module implements the tracking endpoint's core behavior: client
//! fingerprint extraction, duplicate-request filtering over a short trailing
//! window, and the origin image fetch that is proxied back to the caller.

pub mod fingerprint;
pub mod tracker;

pub use fingerprint::{extract_fingerprint, Fingerprint};
pub use tracker::{TrackError, TrackedImage, Tracker, DEDUP_WINDOW_SECS};
