//! Strata Tests - integration and scenario tests for the gateway.
//!
//! Unit tests live inline in each crate under `#[cfg(test)]`; this crate
//! holds the multi-component scenarios:
//!
//! - `gateway_tests`: foreground paths end to end - put/get/delete/copy,
//!   link dereference and un-evict, conditional gets, container lifecycle
//! - `listing_tests`: merged namespace listing determinism, marker flags,
//!   link sizes, region folding, pagination
//! - `takeover_tests`: bulk adoption of a far namespace and the
//!   sanity-check audit
//! - `concurrency_tests`: per-object lock serialization under concurrent
//!   reconciliation
//!
//! All scenarios run over two seeded [`strata_store::MemoryStore`]s with a
//! manual clock and a manual executor, so timing-dependent behavior (age
//! thresholds, delayed reconciliation) is fully deterministic.
//!
//! Naming convention: `test_<component>_<scenario>`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod support;

#[cfg(test)]
mod concurrency_tests;
#[cfg(test)]
mod takeover_tests;
