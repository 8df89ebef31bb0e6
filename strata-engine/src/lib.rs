//! Strata Engine - the tiered-storage reconciliation engine.
//!
//! This crate is the core of the gateway: it fronts two [`ObjectStore`]
//! tiers (near and far) behind one namespace, migrating objects between
//! them by age-based write-back policy.
//!
//! # Components
//!
//! - [`Link`]: the pointer record that replaces a migrated object's payload
//!   at the near tier
//! - marker protocol ([`marker`]): name-based sentinels recording "pending
//!   reconciliation"
//! - [`LockTable`]: per-object mutual exclusion between foreground mutation
//!   and background reconciliation
//! - [`TierGateway`]: the decision engine, foreground paths, namespace
//!   listing merge, and bulk takeover / sanity-check
//! - [`TaskExecutor`]: the delayed-task collaborator reconciliation is
//!   scheduled onto
//!
//! # Consistency model
//!
//! The gateway targets eventual, self-healing consistency between tiers:
//! reconciliation is idempotent, transient backend failures resolve to a
//! no-op and retry on the next scheduled pass, and foreground races are
//! repaired by the next pass observing current state.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use strata_core::SystemClock;
//! use strata_engine::{GatewayConfig, PolicyOptions, PolicyRegistry, TierGateway, TokioExecutor};
//! use strata_store::MemoryStore;
//!
//! let policy = PolicyRegistry::with_defaults().create(
//!     "write-back",
//!     &PolicyOptions {
//!         copy_delay: Some(std::time::Duration::ZERO),
//!         evict_delay: None,
//!     },
//! )?;
//! let gateway = TierGateway::new(
//!     MemoryStore::new(1),
//!     MemoryStore::new(2),
//!     policy,
//!     Arc::new(TokioExecutor::new()),
//!     Arc::new(SystemClock),
//!     GatewayConfig::default(),
//! );
//! gateway.create_container("photos").await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

mod error;
mod gateway;
mod link;
mod list;
mod lock;
mod policy;
mod reconcile;
mod region;
mod registry;
mod schedule;
mod takeover;

pub mod marker;

pub use error::{EngineError, EngineResult};
pub use gateway::{Fetched, GatewayConfig, TierGateway};
pub use link::{create_link, scrub_system_metadata, Link, LINK_TAG, SYSTEM_METADATA_PREFIX};
pub use lock::{LockGuard, LockTable};
pub use policy::{Action, Outcome, ReconcilePolicy, WriteBackPolicy};
pub use region::{Region, RegionSet, TierMeta, TierPage, REGIONS_TAG};
pub use registry::{PolicyOptions, PolicyRegistry};
pub use schedule::{drain_pending, BoxedTask, ManualExecutor, TaskExecutor, TokioExecutor};
