//! Strata Store - object-store abstraction for the tiered-storage gateway.
//!
//! This crate defines the [`ObjectStore`] trait the gateway engine is generic
//! over, together with the object/page metadata model and two implementations:
//!
//! - [`MemoryStore`]: in-memory store with seeded, deterministic fault
//!   injection, used by every test in the workspace
//! - [`TracingStore`]: a forwarding decorator that logs each operation with
//!   structured fields
//!
//! Real backends (S3, Swift, filesystem) are external collaborators that
//! implement the same trait; the engine never names a concrete backend.
//!
//! # Design Principles
//!
//! - **Deterministic testing**: faults come from a seeded hash, not an RNG
//! - **Explicit limits**: listings are paginated with explicit caps
//! - **Assertions**: pre/postconditions on every mutation
//! - **No unsafe code**: Safety > Performance

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

mod error;
mod forward;
mod memory;
mod meta;
mod store;

pub use error::{StoreError, StoreResult};
pub use forward::TracingStore;
pub use memory::{MemoryStore, StoreFaultConfig};
pub use meta::{etags_equal, CopyOptions, GetOptions, ListOptions, Object, ObjectMeta, Page};
pub use store::ObjectStore;
