//! The tier gateway: foreground client paths.
//!
//! `TierGateway` owns the two tiers, the policy, the per-object lock table,
//! and the injected executor/clock collaborators. Foreground mutations
//! update marker bookkeeping and schedule delayed reconciliation; they
//! never block behind background work.
//!
//! The reconciliation pass itself lives in `reconcile.rs`, the namespace
//! merge in `list.rs`, and takeover/sanity-check in `takeover.rs`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use strata_core::{limits, Clock, ObjectKey};
use strata_store::{
    etags_equal, CopyOptions, GetOptions, Object, ObjectMeta, ObjectStore, StoreError,
};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::link::{create_link, scrub_system_metadata, Link};
use crate::lock::LockTable;
use crate::marker::{self, NameEncoding};
use crate::policy::ReconcilePolicy;
use crate::schedule::{drain_pending, TaskExecutor};

// -----------------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------------

/// Gateway tuning knobs.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// How long container deletion waits for pending reconciliation before
    /// proceeding best-effort.
    pub drain_timeout: Duration,
    /// Default page cap for merged listings.
    pub list_page_max: u32,
    /// Concurrency cap for takeover and sanity-check crawls.
    pub crawl_concurrency: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_millis(limits::DRAIN_TIMEOUT_MS_DEFAULT),
            list_page_max: limits::LIST_PAGE_MAX_DEFAULT,
            crawl_concurrency: limits::CRAWL_CONCURRENCY_MAX,
        }
    }
}

// -----------------------------------------------------------------------------
// Fetched
// -----------------------------------------------------------------------------

/// Outcome of a get: the conditional-get check returns its results as
/// explicit variants rather than errors.
#[derive(Debug)]
pub enum Fetched {
    /// The object, with system metadata scrubbed.
    Object(Object),
    /// No such object.
    Absent,
    /// A conditional get matched if-none-match / if-modified-since.
    NotModified,
    /// A conditional get failed if-match / if-unmodified-since.
    PreconditionFailed,
}

impl Fetched {
    /// The fetched object, if any. Convenience for tests and callers that
    /// issued an unconditional get.
    #[must_use]
    pub fn into_object(self) -> Option<Object> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }
}

// -----------------------------------------------------------------------------
// TierGateway
// -----------------------------------------------------------------------------

pub(crate) struct Inner<N, F> {
    pub(crate) near: Arc<N>,
    pub(crate) far: Arc<F>,
    pub(crate) policy: Box<dyn ReconcilePolicy>,
    pub(crate) executor: Arc<dyn TaskExecutor>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) locks: LockTable,
    pub(crate) takeover_in_progress: AtomicBool,
    pub(crate) config: GatewayConfig,
}

/// The tiered-storage gateway.
///
/// Generic over the two store implementations; never over a concrete store
/// type. Cloning is cheap and clones share all state.
pub struct TierGateway<N, F> {
    pub(crate) inner: Arc<Inner<N, F>>,
}

impl<N, F> Clone for TierGateway<N, F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<N: ObjectStore, F: ObjectStore> TierGateway<N, F> {
    /// Creates a gateway over a near and a far tier.
    #[must_use]
    pub fn new(
        near: N,
        far: F,
        policy: Box<dyn ReconcilePolicy>,
        executor: Arc<dyn TaskExecutor>,
        clock: Arc<dyn Clock>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                near: Arc::new(near),
                far: Arc::new(far),
                policy,
                executor,
                clock,
                locks: LockTable::new(),
                takeover_in_progress: AtomicBool::new(false),
                config,
            }),
        }
    }

    /// The near tier.
    #[must_use]
    pub fn near(&self) -> &N {
        &self.inner.near
    }

    /// The far tier.
    #[must_use]
    pub fn far(&self) -> &F {
        &self.inner.far
    }

    /// True while a bulk takeover crawl is running.
    #[must_use]
    pub fn takeover_in_progress(&self) -> bool {
        self.inner.takeover_in_progress.load(Ordering::SeqCst)
    }

    /// Marker-name encoding for the near tier.
    pub(crate) fn name_encoding(&self) -> NameEncoding {
        if self.inner.near.preserves_raw_names() {
            NameEncoding::Verbatim
        } else {
            NameEncoding::Escaped
        }
    }

    // -------------------------------------------------------------------------
    // Marker bookkeeping
    // -------------------------------------------------------------------------

    pub(crate) async fn put_marker(&self, container: &str, name: &str) -> EngineResult<()> {
        let marker = marker::marker_name(name, self.name_encoding());
        self.inner
            .near
            .put(container, &marker, Bytes::new(), BTreeMap::new())
            .await?;
        Ok(())
    }

    pub(crate) async fn remove_marker(&self, container: &str, name: &str) -> EngineResult<()> {
        debug!(container, name, "deleting marker");
        let marker = marker::marker_name(name, self.name_encoding());
        self.inner.near.delete(container, &marker).await?;
        Ok(())
    }

    pub(crate) async fn marker_present(&self, container: &str, name: &str) -> EngineResult<bool> {
        let marker = marker::marker_name(name, self.name_encoding());
        Ok(self.inner.near.metadata(container, &marker).await?.is_some())
    }

    /// Schedules reconciliation of one object at the policy's delays. Copy
    /// and evict get independent tasks when their delays differ.
    pub(crate) fn enqueue_reconcile(&self, container: &str, name: &str) {
        let copy_delay = self.inner.policy.copy_delay();
        if let Some(delay) = copy_delay {
            self.spawn_reconcile(container, name, delay);
        }
        if let Some(delay) = self.inner.policy.evict_delay() {
            if copy_delay != Some(delay) {
                self.spawn_reconcile(container, name, delay);
            }
        }
    }

    fn spawn_reconcile(&self, container: &str, name: &str, delay: Duration) {
        let gateway = self.clone();
        let container = container.to_string();
        let name = name.to_string();
        self.inner.executor.schedule(
            delay,
            Box::pin(async move {
                match gateway.reconcile_object(&container, &name).await {
                    Ok(outcome) => debug!(%container, %name, ?outcome, "reconciled"),
                    Err(error) => warn!(
                        %container,
                        %name,
                        %error,
                        "reconciliation failed; will retry on a later pass"
                    ),
                }
            }),
        );
    }

    // -------------------------------------------------------------------------
    // Containers
    // -------------------------------------------------------------------------

    /// Creates the container at both tiers. Returns true if either tier
    /// newly created it.
    ///
    /// # Errors
    ///
    /// Returns an error if either tier fails.
    pub async fn create_container(&self, container: &str) -> EngineResult<bool> {
        let far_created = self.inner.far.create_container(container).await?;
        let near_created = self.inner.near.create_container(container).await?;
        Ok(far_created | near_created)
    }

    /// Deletes the container from both tiers if empty at the near tier.
    ///
    /// Waits for pending reconciliation to drain first; on timeout the
    /// deletion proceeds best-effort and the wait is logged, not failed.
    ///
    /// # Errors
    ///
    /// Returns an error if a tier fails the deletion itself.
    pub async fn delete_container(&self, container: &str) -> EngineResult<bool> {
        if let Err(error) =
            drain_pending(&*self.inner.executor, self.inner.config.drain_timeout).await
        {
            warn!(container, %error, "proceeding with container deletion");
        }

        if !self.inner.near.delete_container_if_empty(container).await? {
            info!(container, "container not empty");
            return Ok(false);
        }
        if !self.inner.far.delete_container_if_empty(container).await? {
            info!(container, "far tier container not empty, leaving it");
        }
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Mutation path
    // -------------------------------------------------------------------------

    /// Writes an object through the gateway.
    ///
    /// Writes the pending marker, then the payload, then schedules delayed
    /// reconciliation. Does not block behind an in-flight reconciliation of
    /// the same name; any race is repaired by the next pass.
    ///
    /// # Errors
    ///
    /// Rejects reserved-prefix and marker-suffixed names, and payloads
    /// tagged as links, as `Unsupported`.
    pub async fn put(
        &self,
        container: &str,
        name: &str,
        payload: Bytes,
        user_metadata: BTreeMap<String, String>,
    ) -> EngineResult<String> {
        if marker::is_reserved(name) {
            return Err(EngineError::unsupported("illegal prefix"));
        }
        if marker::has_marker_suffix(name) {
            return Err(EngineError::unsupported(format!("illegal suffix: {name}")));
        }
        if user_metadata.contains_key(crate::link::LINK_TAG) {
            return Err(EngineError::unsupported(format!("{name} is a link")));
        }

        let key = ObjectKey::new(container, name);
        let _guard = self.inner.locks.try_lock(&key);

        self.put_marker(container, name).await?;
        let etag = self
            .inner
            .near
            .put(container, name, payload, user_metadata)
            .await?;
        self.enqueue_reconcile(container, name);
        Ok(etag)
    }

    /// Deletes an object from the unified namespace.
    ///
    /// The far copy, if any, is cleaned up by the scheduled reconciliation
    /// pass observing "source absent, destination present".
    ///
    /// # Errors
    ///
    /// Rejects reserved-prefix and marker-suffixed names as `Unsupported`.
    pub async fn delete(&self, container: &str, name: &str) -> EngineResult<()> {
        if marker::is_reserved(name) {
            return Err(EngineError::unsupported("illegal prefix"));
        }
        if marker::has_marker_suffix(name) {
            return Err(EngineError::unsupported(format!("illegal suffix: {name}")));
        }

        if self.takeover_in_progress() {
            self.inner.far.delete(container, name).await?;
            return Ok(());
        }

        let key = ObjectKey::new(container, name);
        let _guard = self.inner.locks.try_lock(&key);

        self.inner.near.delete(container, name).await?;
        self.remove_marker(container, name).await?;
        self.enqueue_reconcile(container, name);
        Ok(())
    }

    /// Copies an object within a container, or updates its metadata in
    /// place when source and destination names are equal.
    ///
    /// Cross-container copy is rejected: the destination container may be
    /// governed by a different policy.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when the source was concurrently migrated between
    /// the metadata read and the copy's completion.
    pub async fn copy(
        &self,
        from_container: &str,
        from_name: &str,
        to_container: &str,
        to_name: &str,
        options: &CopyOptions,
    ) -> EngineResult<Option<String>> {
        if from_container != to_container {
            return Err(EngineError::unsupported("cross container copy"));
        }
        for name in [from_name, to_name] {
            if marker::is_reserved(name) {
                return Err(EngineError::unsupported("illegal prefix"));
            }
            if marker::has_marker_suffix(name) {
                return Err(EngineError::unsupported(format!("illegal suffix: {name}")));
            }
        }
        let container = from_container;

        let Some(source_meta) = self.inner.near.metadata(container, from_name).await? else {
            // Nothing to copy.
            return Ok(None);
        };

        if from_name == to_name && options.user_metadata.is_some() {
            return self
                .replace_metadata(container, from_name, &source_meta, options)
                .await
                .map(Some);
        }

        if Link::is_link(&source_meta) {
            // The far store holds the authoritative object; copy there and
            // point a fresh link at the result.
            let etag = self
                .inner
                .far
                .copy(container, from_name, container, to_name, options)
                .await?;
            let target = self
                .inner
                .far
                .metadata(container, to_name)
                .await?
                .ok_or_else(|| StoreError::NotFound {
                    container: container.to_string(),
                    name: to_name.to_string(),
                })?;
            let link = Link::to_target(self.inner.far.id(), container, &target);
            create_link(&*self.inner.near, container, &link).await?;
            self.remove_marker(container, to_name).await?;
            return Ok(Some(etag));
        }

        self.put_marker(container, to_name).await?;
        let etag = self
            .inner
            .near
            .copy(container, from_name, container, to_name, options)
            .await?;
        if !etags_equal(&etag, &source_meta.etag) {
            // Another writer updated the source mid-copy; if we ended up
            // duplicating a link, drop it and report the conflict.
            let copied = self.inner.near.metadata(container, to_name).await?;
            if let Some(copied) = copied {
                if Link::is_link(&copied) && etags_equal(&etag, &copied.etag) {
                    self.inner.near.delete(container, to_name).await?;
                    return Err(EngineError::Conflict {
                        container: container.to_string(),
                        name: to_name.to_string(),
                        reason: "source migrated during copy",
                    });
                }
            }
            // Otherwise we copied a stale payload; the scheduled pass
            // converges it.
        }
        self.enqueue_reconcile(container, to_name);
        Ok(Some(etag))
    }

    /// Pure metadata replacement at whichever tiers hold the object.
    async fn replace_metadata(
        &self,
        container: &str,
        name: &str,
        source_meta: &ObjectMeta,
        options: &CopyOptions,
    ) -> EngineResult<String> {
        if Link::is_link(source_meta) {
            let etag = self
                .inner
                .far
                .copy(container, name, container, name, options)
                .await?;
            let target = self
                .inner
                .far
                .metadata(container, name)
                .await?
                .ok_or_else(|| StoreError::NotFound {
                    container: container.to_string(),
                    name: name.to_string(),
                })?;
            // The wholesale replace clobbered nothing at near: re-derive
            // the link so it preserves the new metadata.
            let link = Link::to_target(self.inner.far.id(), container, &target);
            create_link(&*self.inner.near, container, &link).await?;
            Ok(etag)
        } else {
            match self
                .inner
                .far
                .copy(container, name, container, name, options)
                .await
            {
                // Not propagated to the far tier yet; that's fine.
                Ok(_) | Err(StoreError::NotFound { .. }) => {}
                Err(error) => return Err(error.into()),
            }
            let etag = self
                .inner
                .near
                .copy(container, name, container, name, options)
                .await?;
            Ok(etag)
        }
    }

    // -------------------------------------------------------------------------
    // Read path
    // -------------------------------------------------------------------------

    /// Fetches an object, dereferencing a link transparently.
    ///
    /// Reading a migrated object durably "un-evicts" it: the far payload is
    /// served to the caller while a background task restores it at the near
    /// tier. Conditional gets fall back to a synchronous far-to-near round
    /// trip, since their outcome must reflect the restored object.
    ///
    /// # Errors
    ///
    /// Rejects reserved-prefix names as `Unsupported`.
    pub async fn get(
        &self,
        container: &str,
        name: &str,
        options: &GetOptions,
    ) -> EngineResult<Fetched> {
        if marker::is_reserved(name) {
            return Err(EngineError::unsupported("illegal prefix"));
        }

        let conditional = options.is_conditional();
        if conditional {
            if let Some(outcome) = self.check_conditions(container, name, options).await? {
                return Ok(outcome);
            }
        }

        let fetched = self
            .inner
            .near
            .get(container, name, &GetOptions::default())
            .await?;
        let Some(object) = fetched else {
            if self.takeover_in_progress() {
                let far = self
                    .inner
                    .far
                    .get(container, name, &GetOptions::default())
                    .await?;
                return Ok(far.map_or(Fetched::Absent, |o| Fetched::Object(scrubbed(o))));
            }
            return Ok(Fetched::Absent);
        };

        if !Link::is_link(&object.meta) {
            return Ok(Fetched::Object(scrubbed(object)));
        }

        debug!(container, name, "following link");
        let link = Link::decode(&object.payload)?;
        let far_object = self
            .inner
            .far
            .get(container, name, &GetOptions::default())
            .await?
            .ok_or_else(|| StoreError::NotFound {
                container: container.to_string(),
                name: name.to_string(),
            })?;

        if conditional {
            // Synchronous round trip: restore the near payload, then serve.
            self.inner
                .near
                .put(
                    container,
                    name,
                    far_object.payload.clone(),
                    link.user_metadata.clone(),
                )
                .await?;
        } else {
            // Serve the far payload now; write the same bytes back to near
            // in the background, returning the object to a live payload.
            let near = self.inner.near.clone();
            let payload = far_object.payload.clone();
            let user_metadata = link.user_metadata.clone();
            let container = container.to_string();
            let name = name.to_string();
            self.inner.executor.schedule_immediate(Box::pin(async move {
                if let Err(error) = near.put(&container, &name, payload, user_metadata).await {
                    warn!(%container, %name, %error, "re-materializing linked object failed");
                }
            }));
        }
        Ok(Fetched::Object(scrubbed(far_object)))
    }

    /// Fetches an object's metadata, dereferencing a link.
    ///
    /// # Errors
    ///
    /// Rejects reserved-prefix names as `Unsupported`.
    pub async fn metadata(&self, container: &str, name: &str) -> EngineResult<Option<ObjectMeta>> {
        if marker::is_reserved(name) {
            return Err(EngineError::unsupported("illegal prefix"));
        }

        let Some(meta) = self.inner.near.metadata(container, name).await? else {
            if self.takeover_in_progress() {
                let far = self.inner.far.metadata(container, name).await?;
                return Ok(far.map(scrubbed_meta));
            }
            return Ok(None);
        };

        if !Link::is_link(&meta) {
            return Ok(Some(scrubbed_meta(meta)));
        }

        // Decode the stored record and present the target's metadata.
        let Some(object) = self
            .inner
            .near
            .get(container, name, &GetOptions::default())
            .await?
        else {
            return Ok(None);
        };
        if Link::is_link(&object.meta) {
            let link = Link::decode(&object.payload)?;
            Ok(Some(link.target_meta()))
        } else {
            // Re-materialized between the metadata read and the get.
            Ok(Some(scrubbed_meta(object.meta)))
        }
    }

    /// Evaluates conditional-get headers against resolved metadata, before
    /// any link is followed. Returns `None` when the fetch should proceed.
    async fn check_conditions(
        &self,
        container: &str,
        name: &str,
        options: &GetOptions,
    ) -> EngineResult<Option<Fetched>> {
        let Some(meta) = self.metadata(container, name).await? else {
            return Ok(Some(Fetched::Absent));
        };
        if let Some(expected) = &options.if_match {
            if !etags_equal(expected, &meta.etag) {
                return Ok(Some(Fetched::PreconditionFailed));
            }
        }
        if let Some(absent) = &options.if_none_match {
            if etags_equal(absent, &meta.etag) {
                return Ok(Some(Fetched::NotModified));
            }
        }
        if let Some(since) = options.if_modified_since {
            if meta.last_modified <= since {
                return Ok(Some(Fetched::NotModified));
            }
        }
        if let Some(since) = options.if_unmodified_since {
            if meta.last_modified > since {
                return Ok(Some(Fetched::PreconditionFailed));
            }
        }
        Ok(None)
    }
}

pub(crate) fn scrubbed_meta(mut meta: ObjectMeta) -> ObjectMeta {
    scrub_system_metadata(&mut meta);
    meta
}

pub(crate) fn scrubbed(mut object: Object) -> Object {
    scrub_system_metadata(&mut object.meta);
    object
}
