//! Strata Core - shared types for the tiered-storage gateway.
//!
//! This crate provides the small pieces every other Strata crate agrees on:
//! object keys, the injectable clock, and explicit resource limits. It does
//! NOT know anything about stores or policies - those live in `strata-store`
//! and `strata-engine`.
//!
//! # Design Principles
//!
//! - **Strongly-typed keys**: an `ObjectKey` is not a pair of loose strings
//! - **Injectable time**: age computation must be deterministic under test
//! - **Explicit limits**: every fan-out and page size has a named bound
//! - **No unsafe code**: Safety > Performance

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

mod clock;
mod key;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::ObjectKey;

/// Gateway-wide limits.
pub mod limits {
    /// Default page cap for merged namespace listings.
    pub const LIST_PAGE_MAX_DEFAULT: u32 = 1000;

    /// Maximum concurrent tasks for takeover and sanity-check crawls.
    pub const CRAWL_CONCURRENCY_MAX: u32 = 100;

    /// Grace added to object age before comparing against a policy delay,
    /// avoiding flapping at exactly the threshold.
    pub const AGE_GRACE_SECS: u64 = 1;

    /// Default wait before giving up on draining pending reconciliation.
    pub const DRAIN_TIMEOUT_MS_DEFAULT: u64 = 30_000;

    /// Poll interval while waiting for pending reconciliation to drain.
    pub const DRAIN_POLL_INTERVAL_MS: u64 = 10;
}
